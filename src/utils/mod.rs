use std::path::{Path, PathBuf};
use tokio::fs::{DirEntry, ReadDir};
use tokio::io;

/// Depth-first walk over a staging tree.
pub struct FileWalker {
    omit_directories: bool,
    stack: Vec<ReadDir>,
}

impl FileWalker {
    /// Regular files only.
    pub async fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(FileWalker {
            omit_directories: true,
            stack: vec![tokio::fs::read_dir(path).await?],
        })
    }

    /// Files and the directories containing them, parents first.
    pub async fn with_directories(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(FileWalker {
            omit_directories: false,
            stack: vec![tokio::fs::read_dir(path).await?],
        })
    }

    pub async fn next(&mut self) -> io::Result<Option<DirEntry>> {
        loop {
            let top = match self.stack.last_mut() {
                Some(top) => top,
                None => return Ok(None),
            };

            let next = match top.next_entry().await? {
                Some(entry) => entry,
                None => {
                    self.stack.pop();
                    continue;
                }
            };

            if !next.file_type().await?.is_dir() {
                return Ok(Some(next));
            }

            self.stack.push(tokio::fs::read_dir(next.path()).await?);

            if !self.omit_directories {
                return Ok(Some(next));
            }
        }
    }

    /// Drains the walk into a sorted path list, for stable archive ordering.
    pub async fn collect_sorted(mut self) -> io::Result<Vec<PathBuf>> {
        let mut paths = vec![];
        while let Some(entry) = self.next().await? {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;

    #[tokio::test]
    async fn walks_nested_tree() {
        let root = scratch_dir("walker");
        std::fs::create_dir_all(root.join("pilot.app/Contents/MacOS")).unwrap();
        std::fs::write(root.join("pilot.app/Contents/MacOS/pilot"), b"bin").unwrap();
        std::fs::write(root.join("pilot.app/Contents/Info.plist"), b"plist").unwrap();

        let files = FileWalker::new(&root).await.unwrap().collect_sorted().await.unwrap();
        assert_eq!(
            files,
            vec![
                root.join("pilot.app/Contents/Info.plist"),
                root.join("pilot.app/Contents/MacOS/pilot"),
            ]
        );

        let all = FileWalker::with_directories(&root)
            .await
            .unwrap()
            .collect_sorted()
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.contains(&root.join("pilot.app/Contents/MacOS")));
    }
}
