use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn parse<T: AsRef<str>>(data: T) -> Option<Platform> {
        Some(match data.as_ref() {
            "windows" => Platform::Windows,
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
        }
    }

    pub fn executable_suffix(&self) -> &'static str {
        match self {
            Platform::Windows => ".exe",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn parse<T: AsRef<str>>(data: T) -> Option<Arch> {
        Some(match data.as_ref() {
            "x86_64" | "amd64" => Arch::X86_64,
            "aarch64" | "arm64" => Arch::Aarch64,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PackagingStrategy {
    Flat,
    Bundle,
}

impl PackagingStrategy {
    pub fn parse<T: AsRef<str>>(data: T) -> Option<PackagingStrategy> {
        Some(match data.as_ref() {
            "flat" => PackagingStrategy::Flat,
            "bundle" | "app-bundle" => PackagingStrategy::Bundle,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn parse<T: AsRef<str>>(data: T) -> Option<ArchiveFormat> {
        Some(match data.as_ref() {
            "zip" => ArchiveFormat::Zip,
            "tar.gz" | "tgz" => ArchiveFormat::TarGz,
            _ => return None,
        })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

/// One platform/architecture combination and how it gets shipped.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Target {
    pub name: String,
    pub platform: Platform,
    pub arch: Arch,
    pub triple: String,
    /// Canonical name of the shipped executable, without platform suffix.
    pub output: String,
    pub strategy: PackagingStrategy,
    pub archive: ArchiveFormat,
}

impl Target {
    pub fn new(platform: Platform, arch: Arch, triple: &str, output: &str) -> Self {
        let (strategy, archive) = match platform {
            Platform::Windows => (PackagingStrategy::Flat, ArchiveFormat::Zip),
            Platform::MacOs => (PackagingStrategy::Bundle, ArchiveFormat::TarGz),
            Platform::Linux => (PackagingStrategy::Flat, ArchiveFormat::TarGz),
        };

        Target {
            name: format!("{}-{}", platform.name(), arch.name()),
            platform,
            arch,
            triple: triple.to_string(),
            output: output.to_string(),
            strategy,
            archive,
        }
    }

    pub fn output_file_name(&self) -> String {
        format!("{}{}", self.output, self.platform.executable_suffix())
    }

    pub fn archive_name(&self, app: &str) -> String {
        format!(
            "{}-{}-{}.{}",
            app,
            self.platform.name(),
            self.arch.name(),
            self.archive.extension()
        )
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.triple)
    }
}

const BUILTIN: &[(Platform, Arch, &str)] = &[
    (Platform::Windows, Arch::X86_64, "x86_64-pc-windows-msvc"),
    (Platform::MacOs, Arch::Aarch64, "aarch64-apple-darwin"),
    (Platform::Linux, Arch::X86_64, "x86_64-unknown-linux-gnu"),
];

pub fn builtin_targets(output: &str) -> Vec<Target> {
    BUILTIN
        .iter()
        .map(|(platform, arch, triple)| Target::new(*platform, *arch, triple, output))
        .collect()
}
