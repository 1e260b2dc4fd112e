//! Process-wide limits and settings.

/// Maximum number of simultaneously open file sessions.
pub const MAX_OPEN_FILES: usize = 16;

/// Maximum depth of the current-directory stack, root included.
pub const MAX_PATH_DEPTH: usize = 128;

/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "FAT32SH_LOG";

/// Suffix printed after the current path in the shell prompt.
pub const PROMPT_SUFFIX: &str = "/> ";
