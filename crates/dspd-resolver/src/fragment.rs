//! Configuration fragment discovery and single-file lookup.
//!
//! A fragment is any regular file in the configuration directory whose name
//! ends in `.yaml` or `.yml`.  Fragments are never validated: a file that
//! cannot be opened or parsed is reported and skipped.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use dspd_types::MachineIdentity;
use serde::de::{self, Deserialize, Deserializer, EnumAccess, IgnoredAny, MapAccess, SeqAccess, VariantAccess, Visitor};
use tracing::{debug, warn};

/// Top-level mapping that holds per-machine settings.
pub const MACHINES_KEY: &str = "machines";

/// Per-machine key naming the DSP library directory.
pub const DSP_LIB_KEY: &str = "DSP_LIBRARY_PATH";

const FRAGMENT_EXTENSIONS: [&[u8]; 2] = [b".yaml", b".yml"];

/// Outcome of looking up [`DSP_LIB_KEY`] for one machine in one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentLookup {
    /// The fragment defines the key.  An empty string is a valid value and
    /// clears whatever an earlier fragment set.
    Found(String),
    /// No `machines` entry for the requested identity.
    MachineAbsent,
    /// The machine is listed but has no [`DSP_LIB_KEY`].
    KeyAbsent,
    /// The file could not be opened or read.
    Unreadable,
    /// The file is not valid YAML.
    Malformed,
}

/// List the fragments of `config_dir` in merge order.
///
/// Only regular files are returned; symlinks and directories are ignored even
/// when their names carry a fragment extension.  Names are sorted byte-wise.
/// A missing or unreadable directory yields an empty list.
pub fn discover(config_dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(config_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %config_dir.display(), error = %e, "configuration directory not readable");
            return Vec::new();
        }
    };

    let mut names: Vec<_> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name())
        .filter(|name| {
            let bytes = name.as_encoded_bytes();
            FRAGMENT_EXTENSIONS.iter().any(|ext| bytes.ends_with(ext))
        })
        .collect();

    names.sort_by(|a, b| a.as_encoded_bytes().cmp(b.as_encoded_bytes()));
    names.into_iter().map(|name| config_dir.join(name)).collect()
}

/// Look up `machines.<machine>.DSP_LIBRARY_PATH` in the fragment at `path`.
///
/// Multi-document files are scanned in order and the first document that
/// defines the key wins.  Keys are compared by their scalar text, so a
/// machine named `8250` matches whether the YAML spells it as a number or a
/// string.  Repeated mapping keys are tolerated and the first occurrence is
/// used; a repeat elsewhere in the file does not hide this machine's entry.
///
/// Only a top-level `machines` mapping is consulted.  A `machines` key at
/// any deeper level is ignored, although a flat scan of the YAML event
/// stream (as the libyaml-based C daemon does) would match it.
pub fn lookup_library_path(path: &Path, machine: &MachineIdentity) -> FragmentLookup {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(file = %path.display(), error = %e, "skipping unreadable fragment");
            return FragmentLookup::Unreadable;
        }
    };

    let mut outcome = FragmentLookup::MachineAbsent;
    for document in serde_yaml::Deserializer::from_slice(&bytes) {
        let node = match Node::deserialize(document) {
            Ok(node) => node,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "YAML parser error, skipping fragment");
                return FragmentLookup::Malformed;
            }
        };
        match lookup_in_document(&node, machine.as_str()) {
            FragmentLookup::Found(found) => return FragmentLookup::Found(found),
            FragmentLookup::KeyAbsent => outcome = FragmentLookup::KeyAbsent,
            _ => {}
        }
    }
    outcome
}

fn lookup_in_document(document: &Node, machine: &str) -> FragmentLookup {
    let Some(machines) = document.entry(MACHINES_KEY) else {
        return FragmentLookup::MachineAbsent;
    };
    let Some(settings) = machines.entry(machine) else {
        return FragmentLookup::MachineAbsent;
    };
    match settings.entry(DSP_LIB_KEY).and_then(Node::scalar_text) {
        Some(value) => FragmentLookup::Found(value.to_string()),
        None => FragmentLookup::KeyAbsent,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Document tree
// ────────────────────────────────────────────────────────────────────────────

/// The parts of a YAML document the lookup walks.
///
/// Unlike `serde_yaml::Value`, mappings are kept as entry lists, so a file
/// with a repeated key still parses.  Sequence contents are skipped.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    /// Scalar text; `null` is the empty string.
    Scalar(String),
    Sequence,
    Mapping(Vec<(Node, Node)>),
}

impl Node {
    // First value whose key's scalar text equals `key`.
    fn entry(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Mapping(entries) => entries
                .iter()
                .find(|(k, _)| k.scalar_text() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    fn scalar_text(&self) -> Option<&str> {
        match self {
            Node::Scalar(text) => Some(text),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any YAML node")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::Scalar(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Scalar(String::new()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Scalar(String::new()))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
        Node::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Node::Sequence)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut entries = Vec::new();
        while let Some((key, value)) = map.next_entry::<Node, Node>()? {
            entries.push((key, value));
        }
        Ok(Node::Mapping(entries))
    }

    // `!tag value`: the tag is dropped and the value kept.
    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Node, A::Error> {
        let (_tag, variant) = data.variant::<IgnoredAny>()?;
        variant.newtype_variant::<Node>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(name: &str) -> MachineIdentity {
        MachineIdentity::from_line(name)
    }

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write fragment");
        path
    }

    #[test]
    fn discover_sorts_bytewise_and_filters_extensions() {
        let dir = tempfile::tempdir().expect("tmp dir");
        write(dir.path(), "b.yaml", "");
        write(dir.path(), "A.yml", "");
        write(dir.path(), "a.yaml", "");
        write(dir.path(), "notes.txt", "");
        write(dir.path(), "c.yaml.bak", "");

        let found: Vec<_> = discover(dir.path())
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, vec!["A.yml", "a.yaml", "b.yaml"]);
    }

    #[test]
    fn discover_ignores_directories() {
        let dir = tempfile::tempdir().expect("tmp dir");
        fs::create_dir(dir.path().join("nested.yaml")).expect("mkdir");
        write(dir.path(), "real.yaml", "");
        assert_eq!(discover(dir.path()), vec![dir.path().join("real.yaml")]);
    }

    #[cfg(unix)]
    #[test]
    fn discover_ignores_symlinks() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let target = write(dir.path(), "target.txt", "machines: {}");
        std::os::unix::fs::symlink(&target, dir.path().join("link.yaml")).expect("symlink");
        assert!(discover(dir.path()).is_empty());
    }

    #[test]
    fn discover_missing_directory_is_empty() {
        let dir = tempfile::tempdir().expect("tmp dir");
        assert!(discover(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn lookup_finds_value_for_machine() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            dir.path(),
            "a.yaml",
            "machines:\n  m1:\n    DSP_LIBRARY_PATH: dsp/m1\n  m2:\n    DSP_LIBRARY_PATH: dsp/m2\n",
        );
        assert_eq!(
            lookup_library_path(&path, &machine("m2")),
            FragmentLookup::Found("dsp/m2".to_string())
        );
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(dir.path(), "a.yaml", "machines: {M1: {DSP_LIBRARY_PATH: p}}");
        assert_eq!(lookup_library_path(&path, &machine("m1")), FragmentLookup::MachineAbsent);
    }

    #[test]
    fn lookup_reports_missing_key() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(dir.path(), "a.yaml", "machines: {m1: {OTHER_KEY: x}}");
        assert_eq!(lookup_library_path(&path, &machine("m1")), FragmentLookup::KeyAbsent);
    }

    #[test]
    fn lookup_matches_numeric_machine_keys() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(dir.path(), "a.yaml", "machines:\n  8250:\n    DSP_LIBRARY_PATH: dsp/8250\n");
        assert_eq!(
            lookup_library_path(&path, &machine("8250")),
            FragmentLookup::Found("dsp/8250".to_string())
        );
    }

    #[test]
    fn lookup_reports_malformed_yaml() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(dir.path(), "a.yaml", "machines: [unclosed\n  : :");
        assert_eq!(lookup_library_path(&path, &machine("m1")), FragmentLookup::Malformed);
    }

    #[test]
    fn lookup_missing_file_is_unreadable() {
        let dir = tempfile::tempdir().expect("tmp dir");
        assert_eq!(
            lookup_library_path(&dir.path().join("gone.yaml"), &machine("m1")),
            FragmentLookup::Unreadable
        );
    }

    #[test]
    fn lookup_first_document_wins_within_a_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            dir.path(),
            "a.yaml",
            "machines: {m2: {DSP_LIBRARY_PATH: other}}\n---\nmachines: {m1: {DSP_LIBRARY_PATH: first}}\n---\nmachines: {m1: {DSP_LIBRARY_PATH: second}}\n",
        );
        assert_eq!(
            lookup_library_path(&path, &machine("m1")),
            FragmentLookup::Found("first".to_string())
        );
    }

    #[test]
    fn lookup_tolerates_repeated_keys_elsewhere_in_the_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            dir.path(),
            "b.yaml",
            "machines:\n  m1:\n    DSP_LIBRARY_PATH: p2\n  m0: {}\n  m0: {}\n",
        );
        assert_eq!(
            lookup_library_path(&path, &machine("m1")),
            FragmentLookup::Found("p2".to_string())
        );
    }

    #[test]
    fn lookup_uses_first_of_repeated_keys() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            dir.path(),
            "a.yaml",
            "machines:\n  m1:\n    DSP_LIBRARY_PATH: first\n    DSP_LIBRARY_PATH: second\n",
        );
        assert_eq!(
            lookup_library_path(&path, &machine("m1")),
            FragmentLookup::Found("first".to_string())
        );
    }

    #[test]
    fn lookup_skips_sequence_contents() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            dir.path(),
            "a.yaml",
            "extra: [1, {a: 1, a: 2}]\nmachines:\n  m1:\n    DSP_LIBRARY_PATH: dsp/m1\n",
        );
        assert_eq!(
            lookup_library_path(&path, &machine("m1")),
            FragmentLookup::Found("dsp/m1".to_string())
        );
    }

    #[test]
    fn lookup_ignores_nested_machines_key() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(dir.path(), "a.yaml", "vendor:\n  machines: {m1: {DSP_LIBRARY_PATH: p}}\n");
        assert_eq!(lookup_library_path(&path, &machine("m1")), FragmentLookup::MachineAbsent);
    }
}
