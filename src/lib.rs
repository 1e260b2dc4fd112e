#![cfg_attr(feature = "strict", deny(warnings))]

pub mod constants;
pub mod filesys;
pub mod logging;
pub mod shell;

pub mod prelude {
    pub use crate::filesys::fat32::{AccessMode, FormatOptions, Volume};
    pub use crate::filesys::{BlockDevice, BusyReason, FsError, MountError};
    pub use crate::shell::{Command, Outcome, ShellError};
}
