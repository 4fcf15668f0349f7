//! Parse command handler - Show what would be indexed for one file

use crate::cli::{OutputFormat, ParseArgs};
use crate::commands::CommandContext;
use crate::error::Result;
use crate::parsing::CaseParser;
use crate::schema::TestCase;

/// Run the parse command
pub fn run_parse(args: &ParseArgs, ctx: &CommandContext) -> Result<String> {
    let mut config = ctx.load_config()?;
    if let Some(level) = args.project_level {
        config.parser.project_level = level;
        config.validate()?;
    }

    let parser = CaseParser::from_config(&config)?;
    let cases = parser.parse_file(&args.file)?;

    match ctx.format {
        OutputFormat::Json => ctx.to_json(&cases),
        OutputFormat::Text => Ok(format_cases(&cases, ctx.verbose)),
    }
}

fn format_cases(cases: &[TestCase], with_code: bool) -> String {
    if cases.is_empty() {
        return "No test cases found.\n".to_string();
    }

    let mut output = String::new();
    for case in cases {
        output.push_str(&format!("{} [{}]\n", case.case_name, case.project_name));
        if let Some(doc) = &case.case_description {
            output.push_str(&format!("  {}\n", first_line(doc)));
        }
        if with_code {
            for line in case.case_code.lines() {
                output.push_str(&format!("    {}\n", line));
            }
        }
    }
    output.push_str(&format!("\n{} test cases\n", cases.len()));
    output
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(name: &str, doc: Option<&str>) -> TestCase {
        TestCase {
            project_name: "proj_a".into(),
            project_description: None,
            case_name: name.into(),
            case_description: doc.map(String::from),
            file_path: "suite/proj_a/test_x.py".into(),
            case_code: format!("def {}(self):\n    pass", name),
        }
    }

    #[test]
    fn test_format_cases() {
        let text = format_cases(
            &[case("test_login", Some("Login works.\n\nDetails.")), case("test_logout", None)],
            false,
        );
        assert!(text.contains("test_login [proj_a]\n  Login works.\n"));
        assert!(text.contains("test_logout [proj_a]\n"));
        assert!(text.ends_with("2 test cases\n"));
        assert!(!text.contains("def test_login"));
    }

    #[test]
    fn test_verbose_includes_code() {
        let text = format_cases(&[case("test_login", None)], true);
        assert!(text.contains("    def test_login(self):"));
    }

    #[test]
    fn test_empty() {
        assert_eq!(format_cases(&[], false), "No test cases found.\n");
    }
}
