//! External host tools invoked by uvmboot.

use std::process::Command;

use serde::Deserialize;

/// A host tool: the program plus any leading arguments that precede
/// the operation-specific ones (e.g. `powershell.exe -NoProfile -Command`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ToolSpec")]
pub struct ToolCommand {
    program: String,
    prefix_args: Vec<String>,
}

/// Config form: either a bare program name or a full argv prefix.
#[derive(Deserialize)]
#[serde(untagged)]
enum ToolSpec {
    Program(String),
    Argv(Vec<String>),
}

impl TryFrom<ToolSpec> for ToolCommand {
    type Error = String;

    fn try_from(value: ToolSpec) -> Result<Self, Self::Error> {
        match value {
            ToolSpec::Program(program) => Ok(Self::new(program)),
            ToolSpec::Argv(argv) => {
                let mut argv = argv.into_iter();
                let program = argv
                    .next()
                    .ok_or_else(|| "tool argv must not be empty".to_string())?;
                Ok(Self::new(program).args(argv))
            }
        }
    }
}

impl ToolCommand {
    /// A tool invoked as just `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Append leading arguments passed on every invocation.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Create a [`Command`] with the program and leading arguments filled in.
    pub fn command(&self) -> Command {
        let mut c = Command::new(&self.program);
        c.args(&self.prefix_args);
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        tool: ToolCommand,
    }

    #[test]
    fn parse_forms() {
        let w: Wrapper = toml::from_str(r#"tool = "bcdedit.exe""#).unwrap();
        assert_eq!(w.tool, ToolCommand::new("bcdedit.exe"));
        let w: Wrapper =
            toml::from_str(r#"tool = ["powershell.exe", "-NoProfile", "-Command"]"#).unwrap();
        assert_eq!(
            w.tool,
            ToolCommand::new("powershell.exe").args(["-NoProfile", "-Command"])
        );
        assert!(toml::from_str::<Wrapper>("tool = []").is_err());
    }

    #[test]
    fn command_prefix() {
        let c = ToolCommand::new("sh").args(["-c", "true"]).command();
        assert_eq!(c.get_program(), "sh");
        assert_eq!(c.get_args().collect::<Vec<_>>(), ["-c", "true"]);
    }
}
