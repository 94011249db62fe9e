use crate::definition::target::{
    builtin_targets, ArchiveFormat, Arch, PackagingStrategy, Platform, Target,
};
use crate::definition::{Document, Release, ReleaseOptions};
use kdl::{KdlDocument, KdlNode};
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[error("Failed parsing release definition")]
pub struct ReleaseParserCompoundError {
    #[source_code]
    pub source_code: NamedSource,
    #[related]
    pub(crate) errors: Vec<ReleaseParseError>,
}

#[derive(Debug, Diagnostic, Eq, PartialEq, Error)]
#[error("{kind}")]
pub struct ReleaseParseError {
    /// Offset in chars of the error.
    #[label("{}", label.unwrap_or("here"))]
    pub span: SourceSpan,

    /// Label text for this span. Defaults to `"here"`.
    pub label: Option<&'static str>,

    /// Suggestion for fixing the parser error.
    #[help]
    pub help: Option<String>,

    /// Specific error kind for this parser error.
    pub kind: &'static str,
}

impl ReleaseParseError {
    fn at(span: SourceSpan, kind: &'static str) -> Self {
        ReleaseParseError {
            span,
            label: None,
            help: None,
            kind,
        }
    }
}

const EMPTY_NODES: &[KdlNode] = &[];

pub(crate) trait GetNodes {
    fn nodes(&self) -> &[KdlNode];
}

impl GetNodes for KdlNode {
    fn nodes(&self) -> &[KdlNode] {
        self.children().map_or(EMPTY_NODES, |x| x.nodes())
    }
}

pub trait ParseDocument {
    fn parse_document(
        input: &KdlDocument,
        source: &str,
        filename: Option<&str>,
    ) -> miette::Result<Self>
    where
        Self: Sized,
    {
        let (data, errors) = Self::parse_document_with_errors(input);

        match data {
            Some(obj) if errors.is_empty() => Ok(obj),

            _ => Err(ReleaseParserCompoundError {
                source_code: NamedSource::new(
                    filename
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "[memory.kdl]".to_string()),
                    source.to_string(),
                ),
                errors,
            }
            .into()),
        }
    }

    fn parse_document_with_errors(input: &KdlDocument) -> (Option<Self>, Vec<ReleaseParseError>)
    where
        Self: Sized;
}

pub trait ParseNode {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ReleaseParseError>)
    where
        Self: Sized;
}

#[macro_export]
macro_rules! parse_string_into {
    ($input:ident, $into:expr, $errors:expr, $name:literal) => {
        match $crate::definition::parsing::extract_single_string_value(
            $input,
            concat!($name, " missing"),
            concat!($name, " should be a string"),
            concat!("only 1 string expected for ", $name),
            concat!($name, " expected a value, property found instead"),
        ) {
            Ok(n) => $into = n.into(),
            Err(e) => $errors.push(e),
        };
    };
}

#[macro_export]
macro_rules! parse_bool_into {
    ($input:ident, $into:expr, $errors:expr, $name:literal) => {
        match $crate::definition::parsing::extract_single_bool_value(
            $input,
            concat!($name, " missing"),
            concat!($name, " should be a bool"),
            concat!("only 1 bool expected for ", $name),
            concat!($name, " expected a value, property found instead"),
        ) {
            Ok(n) => $into = n,
            Err(e) => $errors.push(e),
        };
    };
}

impl ParseDocument for Document {
    fn parse_document_with_errors(input: &KdlDocument) -> (Option<Self>, Vec<ReleaseParseError>)
    where
        Self: Sized,
    {
        let mut release: Option<Release> = None;
        let mut errors = vec![];

        for node in input.nodes() {
            match node.name().value() {
                "release" => {
                    if release.is_some() {
                        errors.push(ReleaseParseError {
                            span: *node.span(),
                            label: Some("second release here"),
                            help: None,
                            kind: "a definition can only describe one release",
                        });
                        continue;
                    }

                    let (rel, err) = Release::parse_node_with_errors(node);
                    errors.extend(err);
                    release = rel;
                }

                _ => errors.push(ReleaseParseError {
                    span: *node.name().span(),
                    label: None,
                    help: Some("expected `release`".to_string()),
                    kind: "unknown top-level node",
                }),
            }
        }

        if release.is_none() && errors.is_empty() {
            errors.push(ReleaseParseError::at(
                *input.span(),
                "definition has no release node",
            ));
        }

        (Some(Document { release }), errors)
    }
}

impl ParseNode for Release {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ReleaseParseError>)
    where
        Self: Sized,
    {
        let mut errors: Vec<ReleaseParseError> = vec![];

        let mut name: String = "<unnamed>".to_string();
        let mut found_version = false;
        let mut version: String = "0.0.0".to_string();
        let mut identifier: Option<String> = None;
        let mut description: String = "".to_string();
        let mut binary: Option<String> = None;
        let mut icon: String = "icon.svg".to_string();
        let mut manifest: String = "Info.plist".to_string();
        let mut options: Option<ReleaseOptions> = None;

        parse_string_into!(input, name, errors, "name of release");
        for node in input.nodes() {
            match node.name().value() {
                "version" => {
                    found_version = true;
                    parse_string_into!(node, version, errors, "version");
                }

                "identifier" => {
                    parse_string_into!(node, identifier, errors, "identifier");
                }

                "description" => {
                    parse_string_into!(node, description, errors, "description");
                }

                "binary" => {
                    parse_string_into!(node, binary, errors, "binary");
                }

                "icon" => {
                    parse_string_into!(node, icon, errors, "icon");
                }

                "manifest" => {
                    parse_string_into!(node, manifest, errors, "manifest");
                }

                "options" => {
                    if options.is_some() {
                        errors.push(ReleaseParseError {
                            span: *node.span(),
                            label: Some("second definition of options here"),
                            help: None,
                            kind: "redefinition of options",
                        });
                        continue;
                    }

                    let (opt, err) = ReleaseOptions::parse_node_with_errors(node);
                    errors.extend(err);
                    options = opt;
                }

                "target" => {}

                _ => errors.push(ReleaseParseError::at(
                    *node.name().span(),
                    "unknown release property",
                )),
            }
        }

        if !found_version {
            errors.push(ReleaseParseError::at(*input.span(), "release missing version"))
        }

        let binary = binary.unwrap_or_else(|| name.clone());

        let mut targets = vec![];
        for node in input.nodes() {
            if node.name().value() == "target" {
                let (target, err) = Target::parse_node_with_errors(node, &binary);
                errors.extend(err);

                if let Some(target) = target {
                    if targets.iter().any(|t: &Target| t.name == target.name) {
                        errors.push(ReleaseParseError {
                            span: *node.span(),
                            label: Some("duplicate target"),
                            help: None,
                            kind: "target names must be unique",
                        });
                        continue;
                    }

                    targets.push(target);
                }
            }
        }

        if targets.is_empty() {
            targets = builtin_targets(&binary);
        }

        let release = Release {
            identifier: identifier.unwrap_or_else(|| format!("com.{}.app", name)),
            name,
            version,
            description,
            binary,
            icon,
            manifest,
            targets,
            options: options.unwrap_or_default(),
        };

        (Some(release), errors)
    }
}

impl ParseNode for ReleaseOptions {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<ReleaseParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut options = ReleaseOptions::default();

        for node in input.nodes() {
            match node.name().value() {
                "all-or-nothing" => {
                    parse_bool_into!(node, options.all_or_nothing, errors, "all-or-nothing");
                }
                "parallel" => {
                    parse_bool_into!(node, options.parallel, errors, "parallel");
                }
                "rgba-dump" => {
                    parse_bool_into!(node, options.rgba_dump, errors, "rgba-dump");
                }
                _ => errors.push(ReleaseParseError::at(
                    *node.name().span(),
                    "unknown option",
                )),
            }
        }

        (Some(options), errors)
    }
}

impl Target {
    fn parse_node_with_errors(
        input: &KdlNode,
        binary: &str,
    ) -> (Option<Self>, Vec<ReleaseParseError>) {
        let mut errors = vec![];
        let mut name: Option<String> = None;
        let mut platform = None;
        let mut arch = None;
        let mut triple: Option<String> = None;
        let mut strategy = None;
        let mut archive = None;
        let mut output: String = binary.to_string();

        parse_string_into!(input, name, errors, "name of target");

        for node in input.nodes() {
            match node.name().value() {
                "platform" => {
                    platform = parse_keyword(node, &mut errors, "platform", |s| {
                        Platform::parse(s)
                    });
                }
                "arch" => {
                    arch = parse_keyword(node, &mut errors, "arch", |s| Arch::parse(s));
                }
                "triple" => {
                    parse_string_into!(node, triple, errors, "triple");
                }
                "strategy" => {
                    strategy = parse_keyword(node, &mut errors, "strategy", |s| {
                        PackagingStrategy::parse(s)
                    });
                }
                "archive" => {
                    archive = parse_keyword(node, &mut errors, "archive", |s| {
                        ArchiveFormat::parse(s)
                    });
                }
                "output" => {
                    parse_string_into!(node, output, errors, "output");
                }
                _ => errors.push(ReleaseParseError::at(
                    *node.name().span(),
                    "unknown target property",
                )),
            }
        }

        let (platform, arch, triple) = match (platform, arch, triple) {
            (Some(p), Some(a), Some(t)) => (p, a, t),
            _ => {
                errors.push(ReleaseParseError {
                    span: *input.span(),
                    label: None,
                    help: Some("a target needs platform, arch and triple".to_string()),
                    kind: "incomplete target",
                });
                return (None, errors);
            }
        };

        let mut target = Target::new(platform, arch, &triple, &output);
        if let Some(name) = name {
            target.name = name;
        }
        if let Some(strategy) = strategy {
            target.strategy = strategy;
        }
        if let Some(archive) = archive {
            target.archive = archive;
        }

        (Some(target), errors)
    }
}

fn parse_keyword<T>(
    node: &KdlNode,
    errors: &mut Vec<ReleaseParseError>,
    what: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let mut value: Option<String> = None;
    let mut local = vec![];
    parse_string_into!(node, value, local, "keyword");

    if !local.is_empty() {
        errors.extend(local);
        return None;
    }

    let parsed = value.as_deref().and_then(parse);
    if parsed.is_none() {
        errors.push(ReleaseParseError {
            span: first_entry_span(node),
            label: None,
            help: Some(format!("unrecognised {} `{}`", what, value.unwrap_or_default())),
            kind: "unknown keyword value",
        });
    }

    parsed
}

fn first_entry_span(input: &KdlNode) -> SourceSpan {
    input
        .entries()
        .first()
        .map_or(*input.span(), |entry| *entry.span())
}

fn entries_span(input: &KdlNode) -> SourceSpan {
    let entries = input.entries();
    match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => {
            let start = first.span().offset();
            let end = last.span().offset() + last.span().len();
            SourceSpan::new(start.into(), (end - start).into())
        }
        _ => *input.name().span(),
    }
}

pub(crate) fn extract_single_bool_value(
    input: &KdlNode,
    missing_error: &'static str,
    wrong_type_error: &'static str,
    too_many_error: &'static str,
    property_found_error: &'static str,
) -> Result<bool, ReleaseParseError> {
    match input.entries() {
        [] => Err(ReleaseParseError::at(*input.name().span(), missing_error)),

        [entry] => {
            if entry.name().is_some() {
                return Err(ReleaseParseError::at(*entry.span(), property_found_error));
            }

            entry
                .value()
                .as_bool()
                .ok_or_else(|| ReleaseParseError::at(*entry.span(), wrong_type_error))
        }

        _ => Err(ReleaseParseError::at(entries_span(input), too_many_error)),
    }
}

pub(crate) fn extract_single_string_value(
    input: &KdlNode,
    missing_error: &'static str,
    wrong_type_error: &'static str,
    too_many_error: &'static str,
    property_found_error: &'static str,
) -> Result<String, ReleaseParseError> {
    match input.entries() {
        [] => Err(ReleaseParseError::at(*input.name().span(), missing_error)),

        [entry] => {
            if entry.name().is_some() {
                return Err(ReleaseParseError::at(*entry.span(), property_found_error));
            }

            entry
                .value()
                .as_string()
                .map(ToString::to_string)
                .ok_or_else(|| ReleaseParseError::at(*entry.span(), wrong_type_error))
        }

        _ => Err(ReleaseParseError::at(entries_span(input), too_many_error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Option<Document>, Vec<ReleaseParseError>) {
        let doc: KdlDocument = source.parse().unwrap();
        Document::parse_document_with_errors(&doc)
    }

    #[test]
    fn minimal_release_gets_builtin_targets() {
        let (doc, errors) = parse(
            r#"
            release "pilot" {
                version "1.2.0"
            }
            "#,
        );

        assert!(errors.is_empty(), "{:?}", errors);
        let release = doc.unwrap().release.unwrap();
        assert_eq!(release.binary, "pilot");
        assert_eq!(release.icon, "icon.svg");
        assert_eq!(release.manifest, "Info.plist");
        assert_eq!(release.targets.len(), 3);
        assert!(!release.options.all_or_nothing);
    }

    #[test]
    fn explicit_targets_and_options() {
        let (doc, errors) = parse(
            r#"
            release "pilot" {
                version "0.3.1"
                binary "pilot-gui"
                options {
                    all-or-nothing true
                    parallel true
                }
                target "mac-intel" {
                    platform "macos"
                    arch "x86_64"
                    triple "x86_64-apple-darwin"
                    archive "zip"
                }
            }
            "#,
        );

        assert!(errors.is_empty(), "{:?}", errors);
        let release = doc.unwrap().release.unwrap();
        assert!(release.options.all_or_nothing);
        assert!(release.options.parallel);
        assert_eq!(release.targets.len(), 1);

        let target = &release.targets[0];
        assert_eq!(target.name, "mac-intel");
        assert_eq!(target.platform, Platform::MacOs);
        assert_eq!(target.strategy, PackagingStrategy::Bundle);
        assert_eq!(target.archive, ArchiveFormat::Zip);
        assert_eq!(target.output, "pilot-gui");
    }

    #[test]
    fn collects_every_error() {
        let (_, errors) = parse(
            r#"
            release "pilot" {
                icon 12
                target "odd" {
                    platform "beos"
                    arch "x86_64"
                    triple "x86_64-unknown-haiku"
                }
            }
            "#,
        );

        let kinds: Vec<_> = errors.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&"icon should be a string"));
        assert!(kinds.contains(&"unknown keyword value"));
        assert!(kinds.contains(&"incomplete target"));
        assert!(kinds.contains(&"release missing version"));
    }

    #[test]
    fn strict_parse_renders_diagnostic() {
        let source = "package \"x\"";
        let doc: KdlDocument = source.parse().unwrap();
        let err = Document::parse_document(&doc, source, Some("release.kdl")).unwrap_err();
        assert_eq!(err.to_string(), "Failed parsing release definition");
    }

    #[test]
    fn demo_definition_parses() {
        let (doc, errors) = parse(include_str!("../../demos/release.kdl"));

        assert!(errors.is_empty(), "{:?}", errors);
        let release = doc.unwrap().release.unwrap();
        assert_eq!(release.identifier, "org.sketchpad.desktop");
        assert!(release.options.rgba_dump);
        assert_eq!(
            release.targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["windows-x86_64", "macos-aarch64", "linux-x86_64"]
        );
    }
}
