//! URIs of virtual documents.
//!
//! A root document is addressed by its percent-encoded path. A foreign
//! document appends its id path and file extension to the root path, so a
//! server sees `notebook.ipynb.python-r.R` next to the notebook and can
//! resolve relative imports from the same directory.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Characters escaped in a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encode each `/`-separated segment of `path`.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// URI of a virtual document relative to the workspace root.
///
/// `foreign` carries the id path and file extension of a foreign document;
/// root documents pass `None`.
pub fn virtual_document_uri(path: &str, foreign: Option<(&str, &str)>) -> String {
    let encoded = encode_path(path);
    match foreign {
        Some((id_path, file_extension)) => format!(
            "{encoded}.{}.{}",
            utf8_percent_encode(id_path, PATH_SEGMENT),
            utf8_percent_encode(file_extension, PATH_SEGMENT)
        ),
        None => encoded,
    }
}

/// Absolute URI sent to a server: `document_uri` resolved against `root_uri`.
pub fn server_uri(root_uri: &str, document_uri: &str) -> Result<String, url::ParseError> {
    let base = url::Url::parse(root_uri)?;
    Ok(base.join(document_uri)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("notebooks/analysis.ipynb", "notebooks/analysis.ipynb")]
    #[case("my notebooks/a#1.ipynb", "my%20notebooks/a%231.ipynb")]
    #[case("/abs/path/x.py", "/abs/path/x.py")]
    #[case("ünïcode.ipynb", "%C3%BCn%C3%AFcode.ipynb")]
    fn encodes_path_segments(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(encode_path(path), expected);
    }

    #[test]
    fn root_uri_is_the_bare_path() {
        assert_eq!(virtual_document_uri("a b.ipynb", None), "a%20b.ipynb");
    }

    #[test]
    fn foreign_uri_appends_id_path_and_extension() {
        assert_eq!(
            virtual_document_uri("nb/a.ipynb", Some(("python-r", "R"))),
            "nb/a.ipynb.python-r.R"
        );
    }

    #[test]
    fn server_uri_joins_the_workspace_root() {
        assert_eq!(
            server_uri("file:///home/user/project/", "nb/a.ipynb.python-r.R").unwrap(),
            "file:///home/user/project/nb/a.ipynb.python-r.R"
        );
        assert_eq!(
            server_uri("file:///home/user/project/", "my%20nb.ipynb").unwrap(),
            "file:///home/user/project/my%20nb.ipynb"
        );
        assert!(server_uri("not a uri", "a.ipynb").is_err());
    }
}
