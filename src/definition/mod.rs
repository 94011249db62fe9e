pub mod parsing;
pub mod target;
pub mod trigger;

use crate::definition::target::Target;
use serde::Serialize;

#[derive(Default, Debug, Clone)]
pub struct Document {
    pub release: Option<Release>,
}

#[derive(Default, Debug, Clone)]
pub struct Release {
    pub name: String,
    pub version: String,
    pub identifier: String,
    pub description: String,
    pub binary: String,
    pub icon: String,
    pub manifest: String,
    pub targets: Vec<Target>,
    pub options: ReleaseOptions,
}

#[derive(Default, Debug, Clone, Copy, Eq, PartialEq)]
pub struct ReleaseOptions {
    pub all_or_nothing: bool,
    pub parallel: bool,
    pub rgba_dump: bool,
}

/// Variables available to the bundle manifest template.
#[derive(Serialize, Debug)]
pub struct ManifestTemplate {
    pub name: String,
    pub version: String,
    pub identifier: String,
    pub binary: String,
    pub description: String,
}

impl Release {
    /// `binary` is the executable as staged for `target`, which follows the
    /// target's output name rather than the cargo bin name.
    pub fn template_vars(&self, target: &Target) -> ManifestTemplate {
        ManifestTemplate {
            name: self.name.clone(),
            version: self.version.clone(),
            identifier: self.identifier.clone(),
            binary: target.output_file_name(),
            description: self.description.clone(),
        }
    }

    pub fn find_target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|x| x.name == name)
    }

    /// Resolves a CLI selection (`all` or a single target name).
    pub fn select_targets(&self, selection: &str) -> Option<Vec<Target>> {
        if selection == "all" {
            return Some(self.targets.clone());
        }

        self.find_target(selection).map(|t| vec![t.clone()])
    }
}
