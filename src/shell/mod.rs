//! Command dispatch between the interactive loop and the mounted volume

use core::fmt;
use std::io::{BufRead, Write};

use log::debug;

use crate::constants::PROMPT_SUFFIX;
use crate::filesys::fat32::{CdOutcome, DirEntry83, OpenFile, Volume, VolumeInfo};
use crate::filesys::FsError;

mod command;

pub use command::Command;

/// Why a command line could not be carried out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    Unknown(String),
    /// Wrong number of arguments; holds the usage line
    Usage(&'static str),
    BadNumber(String),
    Fs(FsError),
}

impl ShellError {
    /// The session must end after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Fs(e) if e.is_fatal())
    }
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::Unknown(verb) => write!(f, "unknown command: {}", verb),
            ShellError::Usage(usage) => write!(f, "usage: {}", usage),
            ShellError::BadNumber(token) => write!(f, "not a number: {}", token),
            ShellError::Fs(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShellError::Fs(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FsError> for ShellError {
    fn from(e: FsError) -> Self {
        ShellError::Fs(e)
    }
}

/// What a successful command produced. `Display` renders it for the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Info(VolumeInfo),
    Listing(Vec<DirEntry83>),
    OpenFiles(Vec<(usize, OpenFile)>),
    Data(Vec<u8>),
    Written { name: String, bytes: usize },
    ChangedDirectory,
    AlreadyAtRoot,
    Done(String),
    Exit,
}

/// Runs one command against the volume.
pub fn execute(volume: &mut Volume, command: Command) -> Result<Outcome, ShellError> {
    let outcome = match command {
        Command::Info => Outcome::Info(volume.info()?),
        Command::Cd(name) => match volume.change_directory(&name)? {
            CdOutcome::Changed => Outcome::ChangedDirectory,
            CdOutcome::AlreadyAtRoot => Outcome::AlreadyAtRoot,
        },
        Command::Ls => Outcome::Listing(volume.list_directory()?),
        Command::Mkdir(name) => {
            volume.make_directory(&name)?;
            Outcome::Done(format!("Directory created: {}", name))
        }
        Command::Rmdir(name) => {
            volume.remove_directory(&name)?;
            Outcome::Done(format!("Directory removed: {}", name))
        }
        Command::Creat(name) => {
            volume.create_file(&name)?;
            Outcome::Done(format!("File '{}' created.", name))
        }
        Command::Open { name, mode } => {
            volume.open_file(&name, mode)?;
            Outcome::Done(format!("Opened {} {}", name, mode))
        }
        Command::Close(name) => {
            volume.close_file(&name)?;
            Outcome::Done(format!("File '{}' closed.", name))
        }
        Command::Lsof => Outcome::OpenFiles(volume.open_files()),
        Command::Lseek { name, offset } => {
            volume.seek_file(&name, offset)?;
            Outcome::Done(format!("Offset of '{}' set to {}.", name, offset))
        }
        Command::Write { name, text } => {
            let bytes = volume.write_file(&name, text.as_bytes())?;
            Outcome::Written { name, bytes }
        }
        Command::Read { name, count } => Outcome::Data(volume.read_file(&name, count)?),
        Command::Rm(name) => {
            volume.delete_file(&name)?;
            Outcome::Done(format!("File '{}' removed.", name))
        }
        Command::Exit => Outcome::Exit,
    };
    Ok(outcome)
}

/// Interactive loop: prompts on `output`, reads command lines from `input`
/// until `exit` or end of input. Ordinary errors are printed and the loop
/// goes on; the first fatal error, including a failure to write to
/// `output`, ends it.
pub fn run<R: BufRead, W: Write>(
    volume: &mut Volume,
    input: R,
    mut output: W,
) -> Result<(), ShellError> {
    let mut lines = input.lines();

    loop {
        write!(output, "{}{}", volume.current_path(), PROMPT_SUFFIX).map_err(FsError::from)?;
        output.flush().map_err(FsError::from)?;

        let line = match lines.next() {
            Some(line) => line.map_err(FsError::from)?,
            None => {
                writeln!(output).map_err(FsError::from)?;
                return Ok(());
            }
        };

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        match Command::parse(&tokens).and_then(|command| execute(volume, command)) {
            Ok(Outcome::Exit) => return Ok(()),
            Ok(outcome) => {
                let text = outcome.to_string();
                if !text.is_empty() {
                    writeln!(output, "{}", text).map_err(FsError::from)?;
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("{} failed: {}", tokens[0], e);
                writeln!(output, "error: {}", e).map_err(FsError::from)?;
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Info(info) => {
                writeln!(f, "Bytes Per Sector: {}", info.bytes_per_sector)?;
                writeln!(f, "Sectors Per Cluster: {}", info.sectors_per_cluster)?;
                writeln!(f, "Root Cluster: {}", info.root_cluster)?;
                writeln!(f, "Total # of Clusters in Data Region: {}", info.total_clusters)?;
                writeln!(f, "# of Entries in One FAT: {}", info.entries_per_fat)?;
                writeln!(f, "Size of Image (in bytes): {}", info.image_size)?;
                writeln!(f, "Reserved Sectors: {}", info.reserved_sectors)?;
                writeln!(f, "Number of FATs: {}", info.fat_count)?;
                writeln!(f, "Sectors Per FAT: {}", info.sectors_per_fat)?;
                writeln!(f, "First Data Sector: {}", info.first_data_sector)?;
                write!(f, "Free Clusters: {}", info.free_clusters)
            }
            Outcome::Listing(entries) => {
                let names: Vec<_> = entries.iter().map(|e| e.display_name()).collect();
                write!(f, "{}", names.join(" "))
            }
            Outcome::OpenFiles(files) if files.is_empty() => write!(f, "No files are open."),
            Outcome::OpenFiles(files) => {
                write!(f, "INDEX\tNAME\tMODE\tOFFSET\tPATH")?;
                for (index, file) in files {
                    write!(
                        f,
                        "\n{}\t{}\t{}\t{}\t{}",
                        index, file.name, file.mode, file.offset, file.path
                    )?;
                }
                Ok(())
            }
            Outcome::Data(data) => write!(f, "{}", String::from_utf8_lossy(data)),
            Outcome::Written { name, bytes } => write!(f, "Wrote {} bytes to '{}'.", bytes, name),
            Outcome::AlreadyAtRoot => write!(f, "Already at root."),
            Outcome::Done(message) => write!(f, "{}", message),
            Outcome::ChangedDirectory | Outcome::Exit => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesys::fat32::test_support::memory_volume;

    fn run(volume: &mut Volume, line: &str) -> Result<Outcome, ShellError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        execute(volume, Command::parse(&tokens)?)
    }

    #[test]
    fn test_session_scenario() {
        let mut volume = memory_volume();

        run(&mut volume, "mkdir SUB").unwrap();
        assert_eq!(run(&mut volume, "cd SUB"), Ok(Outcome::ChangedDirectory));
        assert_eq!(run(&mut volume, "ls").unwrap().to_string(), ". ..");
        run(&mut volume, "creat f.txt").unwrap();
        run(&mut volume, "open f.txt -rw").unwrap();
        assert_eq!(
            run(&mut volume, "write f.txt \"hello\""),
            Ok(Outcome::Written {
                name: "f.txt".into(),
                bytes: 5
            })
        );
        run(&mut volume, "close f.txt").unwrap();
        run(&mut volume, "open f.txt -r").unwrap();
        assert_eq!(run(&mut volume, "read f.txt 5").unwrap().to_string(), "hello");

        assert_eq!(run(&mut volume, "ls").unwrap().to_string(), ". .. F.TXT");
        assert_eq!(volume.current_path(), "NO NAME/SUB");
    }

    /// Writer whose every write fails, like a closed terminal
    struct ClosedOutput;

    impl Write for ClosedOutput {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn test_run_session_until_exit() {
        let mut volume = memory_volume();
        let input = "mkdir SUB\n\ncd SUB\nfrobnicate\nls\nexit\nls\n";
        let mut output = Vec::new();

        super::run(&mut volume, input.as_bytes(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(
            text,
            "NO NAME/> Directory created: SUB\n\
             NO NAME/> \
             NO NAME/> \
             NO NAME/SUB/> error: unknown command: frobnicate\n\
             NO NAME/SUB/> . ..\n\
             NO NAME/SUB/> "
        );
        assert_eq!(volume.current_path(), "NO NAME/SUB");
    }

    #[test]
    fn test_run_ends_at_end_of_input() {
        let mut volume = memory_volume();
        let mut output = Vec::new();
        super::run(&mut volume, "creat a\n".as_bytes(), &mut output).unwrap();
        assert!(String::from_utf8(output).unwrap().ends_with("NO NAME/> \n"));
        assert!(volume.file_exists("a").unwrap());
    }

    #[test]
    fn test_run_stops_when_output_fails() {
        let mut volume = memory_volume();
        let result = super::run(&mut volume, "mkdir SUB\n".as_bytes(), ClosedOutput);

        let error = result.unwrap_err();
        assert!(error.is_fatal());
        assert_eq!(
            error,
            ShellError::Fs(FsError::IoError(std::io::ErrorKind::BrokenPipe))
        );
        // Nothing was executed after the prompt could not be shown
        assert!(!volume.file_exists("SUB").unwrap());
    }

    #[test]
    fn test_cd_up_at_root() {
        let mut volume = memory_volume();
        assert_eq!(run(&mut volume, "cd .."), Ok(Outcome::AlreadyAtRoot));
        assert_eq!(volume.path_depth(), 1);
    }

    #[test]
    fn test_errors_are_reported_not_fatal() {
        let mut volume = memory_volume();
        run(&mut volume, "creat a").unwrap();
        run(&mut volume, "open a -r").unwrap();

        let busy = run(&mut volume, "rm a").unwrap_err();
        assert!(!busy.is_fatal());
        assert_eq!(busy.to_string(), "file is currently open");

        run(&mut volume, "close a").unwrap();
        run(&mut volume, "rm a").unwrap();
        assert_eq!(
            run(&mut volume, "read a 1"),
            Err(ShellError::Fs(FsError::NotOpen))
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(ShellError::Fs(FsError::CorruptChain { start: 9 }).is_fatal());
        assert!(ShellError::Fs(FsError::IoError(std::io::ErrorKind::UnexpectedEof)).is_fatal());
        assert!(!ShellError::Usage("ls").is_fatal());
    }

    #[test]
    fn test_info_and_lsof_rendering() {
        let mut volume = memory_volume();
        let info = run(&mut volume, "info").unwrap().to_string();
        assert!(info.starts_with("Bytes Per Sector: 512\nSectors Per Cluster: 1\nRoot Cluster: 2\n"));
        assert!(info.contains("Size of Image (in bytes): 2097152"));

        assert_eq!(run(&mut volume, "lsof").unwrap().to_string(), "No files are open.");
        run(&mut volume, "creat a.txt").unwrap();
        run(&mut volume, "open a.txt -w").unwrap();
        assert_eq!(
            run(&mut volume, "lsof").unwrap().to_string(),
            "INDEX\tNAME\tMODE\tOFFSET\tPATH\n0\tA.TXT\t-w\t0\tNO NAME"
        );
    }
}
