//! Shell command parsing

use super::ShellError;
use crate::filesys::fat32::AccessMode;

/// One parsed shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Info,
    Cd(String),
    Ls,
    Mkdir(String),
    Rmdir(String),
    Creat(String),
    Open { name: String, mode: AccessMode },
    Close(String),
    Lsof,
    Lseek { name: String, offset: u64 },
    Write { name: String, text: String },
    Read { name: String, count: u64 },
    Rm(String),
    Exit,
}

impl Command {
    /// Parses a whitespace tokenized line. `write` joins every token after
    /// the file name and strips the surrounding quotes.
    pub fn parse(tokens: &[&str]) -> Result<Self, ShellError> {
        let Some((&verb, args)) = tokens.split_first() else {
            return Err(ShellError::Unknown(String::new()));
        };

        let command = match (verb, args) {
            ("info", []) => Command::Info,
            ("cd", [name]) => Command::Cd(name.to_string()),
            ("ls", []) => Command::Ls,
            ("mkdir", [name]) => Command::Mkdir(name.to_string()),
            ("rmdir", [name]) => Command::Rmdir(name.to_string()),
            ("creat", [name]) => Command::Creat(name.to_string()),
            ("open", [name, mode]) => Command::Open {
                name: name.to_string(),
                mode: mode.parse()?,
            },
            ("close", [name]) => Command::Close(name.to_string()),
            ("lsof", []) => Command::Lsof,
            ("lseek", [name, offset]) => Command::Lseek {
                name: name.to_string(),
                offset: parse_number(offset)?,
            },
            ("write", [name, text @ ..]) if !text.is_empty() => Command::Write {
                name: name.to_string(),
                text: quoted_text(text),
            },
            ("read", [name, count]) => Command::Read {
                name: name.to_string(),
                count: parse_number(count)?,
            },
            ("rm", [name]) => Command::Rm(name.to_string()),
            ("exit", []) => Command::Exit,
            _ => {
                return Err(match usage(verb) {
                    Some(text) => ShellError::Usage(text),
                    None => ShellError::Unknown(verb.to_string()),
                })
            }
        };
        Ok(command)
    }
}

fn parse_number(token: &str) -> Result<u64, ShellError> {
    token
        .parse()
        .map_err(|_| ShellError::BadNumber(token.to_string()))
}

/// Rejoins the text tokens of `write` with single spaces, dropping one
/// leading and one trailing double quote.
fn quoted_text(tokens: &[&str]) -> String {
    let joined = tokens.join(" ");
    let text = joined.strip_prefix('"').unwrap_or(&joined);
    text.strip_suffix('"').unwrap_or(text).to_string()
}

fn usage(verb: &str) -> Option<&'static str> {
    let text = match verb {
        "info" => "info",
        "cd" => "cd <dirname>",
        "ls" => "ls",
        "mkdir" => "mkdir <dirname>",
        "rmdir" => "rmdir <dirname>",
        "creat" => "creat <filename>",
        "open" => "open <filename> <-r|-w|-rw|-wr>",
        "close" => "close <filename>",
        "lsof" => "lsof",
        "lseek" => "lseek <filename> <offset>",
        "write" => "write <filename> \"<text>\"",
        "read" => "read <filename> <size>",
        "rm" => "rm <filename>",
        "exit" => "exit",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesys::FsError;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse(&["ls"]), Ok(Command::Ls));
        assert_eq!(Command::parse(&["cd", ".."]), Ok(Command::Cd("..".into())));
        assert_eq!(
            Command::parse(&["open", "f.txt", "-wr"]),
            Ok(Command::Open {
                name: "f.txt".into(),
                mode: AccessMode::ReadWrite
            })
        );
        assert_eq!(
            Command::parse(&["read", "f.txt", "5"]),
            Ok(Command::Read {
                name: "f.txt".into(),
                count: 5
            })
        );
        assert_eq!(Command::parse(&["exit"]), Ok(Command::Exit));
    }

    #[test]
    fn test_write_joins_quoted_tokens() {
        assert_eq!(
            Command::parse(&["write", "f.txt", "\"hello", "big", "world\""]),
            Ok(Command::Write {
                name: "f.txt".into(),
                text: "hello big world".into()
            })
        );
        assert_eq!(
            Command::parse(&["write", "f.txt", "\"hello\""]),
            Ok(Command::Write {
                name: "f.txt".into(),
                text: "hello".into()
            })
        );
        assert_eq!(
            Command::parse(&["write", "f.txt", "bare"]),
            Ok(Command::Write {
                name: "f.txt".into(),
                text: "bare".into()
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Command::parse(&["frobnicate"]),
            Err(ShellError::Unknown("frobnicate".into()))
        );
        assert_eq!(
            Command::parse(&["cd"]),
            Err(ShellError::Usage("cd <dirname>"))
        );
        assert_eq!(
            Command::parse(&["write", "f.txt"]),
            Err(ShellError::Usage("write <filename> \"<text>\""))
        );
        assert_eq!(
            Command::parse(&["lseek", "f", "-1"]),
            Err(ShellError::BadNumber("-1".into()))
        );
        assert_eq!(
            Command::parse(&["open", "f", "-x"]),
            Err(ShellError::Fs(FsError::InvalidMode))
        );
    }
}
