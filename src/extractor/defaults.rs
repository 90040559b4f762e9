//! Built-in extractors for IPython-style notebooks.

use std::sync::Arc;

use crate::document::CellType;

use super::{
    ANY_HOST_LANGUAGE, ExtractorRegistry, IdentityExtractor, PatternExtractor,
    PatternExtractorOptions,
};

/// Host language of the cell magics below.
pub const PYTHON: &str = "python";

struct CellMagic {
    language: &'static str,
    names: &'static [&'static str],
    file_extension: &'static str,
    is_standalone: bool,
}

const CELL_MAGICS: &[CellMagic] = &[
    CellMagic {
        language: "r",
        names: &["R"],
        file_extension: "R",
        is_standalone: false,
    },
    CellMagic {
        language: "shell",
        names: &["bash", "sh"],
        file_extension: "sh",
        is_standalone: false,
    },
    CellMagic {
        language: "javascript",
        names: &["javascript", "js"],
        file_extension: "js",
        is_standalone: false,
    },
    CellMagic {
        language: "html",
        names: &["html"],
        file_extension: "html",
        is_standalone: true,
    },
    CellMagic {
        language: "latex",
        names: &["latex"],
        file_extension: "tex",
        is_standalone: false,
    },
    CellMagic {
        language: "markdown",
        names: &["markdown"],
        file_extension: "md",
        is_standalone: false,
    },
];

/// Pattern of a cell magic: the `%%name [args]` line, then the rest of the cell.
pub fn cell_magic_pattern(names: &[&str]) -> String {
    format!(r"(?m)^%%(?:{})(?:[ \t][^\n]*)?\n([\s\S]*)", names.join("|"))
}

/// Registry with the IPython magics for `python` hosts and markdown cells
/// for any host.
pub fn default_registry() -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();

    registry.register(
        ANY_HOST_LANGUAGE,
        Arc::new(IdentityExtractor::new(
            "markdown",
            "md",
            vec![CellType::Markdown],
        )),
    );

    let cell_magics = CELL_MAGICS.iter().map(|magic| PatternExtractorOptions {
        language: magic.language.to_string(),
        pattern: cell_magic_pattern(magic.names),
        foreign_capture_groups: vec![1],
        is_standalone: magic.is_standalone,
        file_extension: magic.file_extension.to_string(),
        cell_types: vec![CellType::Code],
        keep_in_host: false,
    });
    let line_magic = PatternExtractorOptions {
        language: "r".to_string(),
        pattern: r"(?m)^%R[ \t]+([^\n]*)".to_string(),
        foreign_capture_groups: vec![1],
        is_standalone: true,
        file_extension: "R".to_string(),
        cell_types: vec![CellType::Code],
        keep_in_host: false,
    };

    for options in cell_magics.chain(std::iter::once(line_magic)) {
        let language = options.language.clone();
        match PatternExtractor::new(options) {
            Ok(extractor) => registry.register(PYTHON, Arc::new(extractor)),
            Err(e) => log::error!(
                target: "polylsp::extractor",
                "Skipping built-in {} extractor: {}",
                language,
                e
            ),
        }
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("%%R\nx <- 1", "r", "x <- 1")]
    #[case("%%bash\nls -la", "shell", "ls -la")]
    #[case("%%sh --no-raise-error\necho hi", "shell", "echo hi")]
    #[case("%%js\nconsole.log(1)", "javascript", "console.log(1)")]
    #[case("%%html\n<b>hi</b>", "html", "<b>hi</b>")]
    #[case("%%latex\n\\alpha", "latex", "\\alpha")]
    fn python_cell_magics(#[case] code: &str, #[case] language: &str, #[case] foreign: &str) {
        let registry = default_registry();
        let extractor = registry
            .extractors_for(PYTHON)
            .into_iter()
            .find(|e| e.has_foreign_code(code, CellType::Code))
            .expect("some extractor matches");

        assert_eq!(extractor.language(), language);
        let spans = extractor.extract_foreign_code(code);
        assert_eq!(spans[0].foreign_code.as_deref(), Some(foreign));
        assert_eq!(spans[0].host_code.as_deref(), Some(""));
    }

    #[test]
    fn plain_python_has_no_foreign_code() {
        let registry = default_registry();
        let matched = registry
            .extractors_for(PYTHON)
            .iter()
            .any(|e| e.has_foreign_code("import os\nprint(os.sep)", CellType::Code));
        assert!(!matched);
    }

    #[test]
    fn markdown_cells_apply_to_any_host() {
        let registry = default_registry();
        let first = &registry.extractors_for("julia")[0];
        assert_eq!(first.language(), "markdown");
        assert!(first.has_foreign_code("# Title", CellType::Markdown));
    }

    #[test]
    fn only_html_and_line_magic_are_standalone() {
        let registry = default_registry();
        let mut standalone: Vec<(String, String)> = registry
            .extractors_for(PYTHON)
            .iter()
            .filter(|e| e.is_standalone())
            .map(|e| (e.language().to_string(), e.file_extension().to_string()))
            .collect();
        standalone.sort();
        assert_eq!(
            standalone,
            vec![
                ("html".to_string(), "html".to_string()),
                ("r".to_string(), "R".to_string())
            ]
        );
    }
}
