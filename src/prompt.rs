//! Console prompts standing in for the file and folder pickers.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Asks one question on stderr and reads one line from stdin.
///
/// An empty answer, end of input, or a non-interactive stdin cancels.
pub fn ask_line(question: &str) -> Result<String> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Err(Error::SelectionCancelled(format!("{question} (stdin is not a terminal)")));
    }
    read_answer(&mut stdin.lock(), &mut io::stderr(), question)
}

fn read_answer(input: &mut dyn BufRead, out: &mut dyn Write, question: &str) -> Result<String> {
    write!(out, "{question}: ")?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim().trim_matches('"').trim();
    if answer.is_empty() {
        return Err(Error::SelectionCancelled(question.to_string()));
    }
    Ok(answer.to_string())
}

pub fn ask_path(question: &str) -> Result<PathBuf> {
    ask_line(question).map(PathBuf::from)
}

/// Parses a 1-based start page bounded by `[1, total]`.
pub fn parse_start_page(input: &str, total: u32) -> Result<u32> {
    let page: u32 = input
        .trim()
        .parse()
        .map_err(|_| {
            Error::InvalidInput(format!("start page {:?} is not a number", input.trim()))
        })?;
    check_start_page(page, total)
}

pub fn check_start_page(page: u32, total: u32) -> Result<u32> {
    if page == 0 || page > total.max(1) {
        return Err(Error::InvalidInput(format!(
            "start page {page} outside 1..={}",
            total.max(1)
        )));
    }
    Ok(page)
}

pub fn ask_start_page(total: u32) -> Result<u32> {
    let answer = ask_line(&format!("Start page (1-{})", total.max(1)))?;
    parse_start_page(&answer, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_page_bounds() {
        assert_eq!(parse_start_page(" 3 ", 5).unwrap(), 3);
        assert_eq!(parse_start_page("1", 0).unwrap(), 1);
        assert!(matches!(parse_start_page("0", 5), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_start_page("6", 5), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_start_page("two", 5), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_start_page("-1", 5), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn answers_are_trimmed_and_empty_cancels() {
        let mut out = Vec::new();
        let mut input = io::Cursor::new(b"  \"C:\\docs\\report.docx\"  \n".to_vec());
        let got = read_answer(&mut input, &mut out, "Input document").unwrap();
        assert_eq!(got, "C:\\docs\\report.docx");
        assert_eq!(String::from_utf8(out).unwrap(), "Input document: ");

        let mut input = io::Cursor::new(b"\n".to_vec());
        let err = read_answer(&mut input, &mut Vec::new(), "Output folder").unwrap_err();
        assert!(matches!(err, Error::SelectionCancelled(_)));

        let mut input = io::Cursor::new(Vec::new());
        assert!(read_answer(&mut input, &mut Vec::new(), "x").is_err());
    }
}
