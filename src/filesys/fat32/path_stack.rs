//! Current-directory path stack

use arrayvec::ArrayVec;

use crate::constants::MAX_PATH_DEPTH;
use crate::filesys::FsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub cluster: u32,
}

/// Directories entered from the mount root down to the current one.
/// The root segment is never popped.
#[derive(Debug, Clone)]
pub struct PathStack {
    segments: ArrayVec<PathSegment, MAX_PATH_DEPTH>,
}

impl PathStack {
    pub fn new(root_label: &str, root_cluster: u32) -> Self {
        let mut segments = ArrayVec::new();
        segments.push(PathSegment {
            name: root_label.to_string(),
            cluster: root_cluster,
        });
        Self { segments }
    }

    pub fn push(&mut self, name: &str, cluster: u32) -> Result<(), FsError> {
        self.segments
            .try_push(PathSegment {
                name: name.to_string(),
                cluster,
            })
            .map_err(|_| FsError::PathTooDeep)
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        if self.segments.len() > 1 {
            self.segments.pop()
        } else {
            None
        }
    }

    pub fn truncate_to_root(&mut self) {
        self.segments.truncate(1);
    }

    /// Segments joined by `/`
    pub fn current_path(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.name.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}
