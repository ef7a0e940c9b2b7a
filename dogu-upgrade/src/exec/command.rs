use std::fmt;

/// An executable with its arguments and an optional payload for stdin.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShellCommand {
    command: String,
    args: Vec<String>,
    stdin: Option<Vec<u8>>,
}

impl ShellCommand {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    /// Pipes `input` to the command's stdin.
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Executable followed by its arguments, as handed to the exec sub-protocol.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.command.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_command_line() {
        let command = ShellCommand::new("/pre-upgrade.sh", ["4.2.3-10", "4.2.3-11"]);
        assert_eq!(command.to_string(), "/pre-upgrade.sh 4.2.3-10 4.2.3-11");
        assert_eq!(
            command.argv(),
            vec!["/pre-upgrade.sh", "4.2.3-10", "4.2.3-11"]
        );
        assert_eq!(command.stdin(), None);
        assert_eq!(ShellCommand::new("/bin/ls", Vec::<String>::new()).to_string(), "/bin/ls");
    }

    #[test]
    fn stdin_is_part_of_the_value() {
        let plain = ShellCommand::new("/bin/cat", Vec::<String>::new());
        let piped = plain.clone().with_stdin("hello");
        assert_ne!(plain, piped);
        assert_eq!(piped.stdin(), Some("hello".as_bytes()));
    }
}
