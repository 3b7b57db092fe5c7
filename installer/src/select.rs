//! Choosing which programs to install: flags or an interactive menu.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::catalog::{Tier, catalog};
use crate::core::programs::{Normalization, normalize, parse_program_list};
use crate::core::types::{Platform, ProgramRequest};

const MENU: &str = "Choose an option:\n\
                    a. Install a basic list of applications.\n\
                    b. Install a full developer list of applications.\n\
                    c. Enter a custom list of programs.\n\
                    Your choice: ";
const CUSTOM_PROMPT: &str = "Enter the list of programs to install, separated by commas: ";

/// Where the program list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Catalog(Tier),
    Custom(ProgramRequest),
}

impl Selection {
    pub fn resolve(&self, platform: Platform) -> ProgramRequest {
        match self {
            Self::Catalog(tier) => catalog(*tier, platform),
            Self::Custom(programs) => programs.clone(),
        }
    }
}

/// Ask until the operator picks a, b or c. Closed input is an error.
pub fn prompt_selection<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Selection> {
    loop {
        write!(output, "{MENU}")?;
        output.flush()?;
        let choice = read_line(input)?.to_lowercase();
        match choice.as_str() {
            "a" => return Ok(Selection::Catalog(Tier::Basic)),
            "b" => return Ok(Selection::Catalog(Tier::Developer)),
            "c" => {
                write!(output, "{CUSTOM_PROMPT}")?;
                output.flush()?;
                let list = read_line(input)?;
                return Ok(Selection::Custom(parse_program_list(&list)));
            }
            _ => writeln!(output, "Invalid choice. Please enter 'a', 'b', or 'c'.")?,
        }
    }
}

fn read_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    let n = input.read_line(&mut line).context("read selection")?;
    if n == 0 {
        bail!("input closed before a selection was made");
    }
    Ok(line.trim().to_string())
}

/// Resolve the program list from flags, falling back to the menu.
///
/// `--programs` wins over `--tier`. Normalization runs last.
pub fn select_programs<R: BufRead, W: Write>(
    tier: Option<Tier>,
    programs: Option<&str>,
    platform: Platform,
    rules: Normalization,
    input: &mut R,
    output: &mut W,
) -> Result<ProgramRequest> {
    let selection = match (programs, tier) {
        (Some(list), _) => Selection::Custom(parse_program_list(list)),
        (None, Some(tier)) => Selection::Catalog(tier),
        (None, None) => prompt_selection(input, output)?,
    };
    debug!(?selection, %platform, "program selection");
    Ok(normalize(&selection.resolve(platform), rules))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn prompt(input: &str) -> (Result<Selection>, String) {
        let mut reader = Cursor::new(input.as_bytes().to_vec());
        let mut out = Vec::new();
        let result = prompt_selection(&mut reader, &mut out);
        (result, String::from_utf8(out).expect("utf8"))
    }

    #[test]
    fn invalid_choice_reprompts() {
        let (result, out) = prompt("x\nB\n");
        assert_eq!(result.expect("selection"), Selection::Catalog(Tier::Developer));
        assert_eq!(out.matches("Choose an option:").count(), 2);
        assert!(out.contains("Invalid choice. Please enter 'a', 'b', or 'c'."));
    }

    #[test]
    fn custom_list_is_parsed() {
        let (result, out) = prompt("c\n git, ,curl \n");
        assert_eq!(
            result.expect("selection"),
            Selection::Custom(["git", "curl"].into_iter().collect())
        );
        assert!(out.ends_with(CUSTOM_PROMPT));
    }

    #[test]
    fn closed_input_is_an_error() {
        let (result, _) = prompt("");
        assert!(result.is_err());
    }

    #[test]
    fn programs_flag_wins_over_tier() {
        let programs = select_programs(
            Some(Tier::Basic),
            Some("Git, curl, git"),
            Platform::Linux,
            Normalization {
                lowercase: true,
                dedupe: true,
                sort: false,
            },
            &mut Cursor::new(Vec::new()),
            &mut Vec::new(),
        )
        .expect("programs");
        assert_eq!(programs.as_slice(), ["git", "curl"]);
    }

    #[test]
    fn tier_flag_uses_platform_catalog() {
        let programs = select_programs(
            Some(Tier::Basic),
            None,
            Platform::Darwin,
            Normalization::default(),
            &mut Cursor::new(Vec::new()),
            &mut Vec::new(),
        )
        .expect("programs");
        assert_eq!(programs, catalog(Tier::Basic, Platform::Darwin));
    }

    #[test]
    fn empty_custom_list_is_returned_empty() {
        let programs = select_programs(
            None,
            None,
            Platform::Linux,
            Normalization::default(),
            &mut Cursor::new(b"c\n , ,\n".to_vec()),
            &mut Vec::new(),
        )
        .expect("programs");
        assert!(programs.is_empty());
    }
}
