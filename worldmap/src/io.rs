use crossterm::style::Stylize;

fn terminal_columns() -> usize {
    let (columns, _) = crossterm::terminal::size().ok().unwrap_or((80, 25));
    columns.into()
}

pub(crate) fn wrap_text(text: &str, columns: usize) -> Vec<String> {
    textwrap::wrap(text, columns)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

#[inline]
pub(crate) fn display_text<S: AsRef<str>>(text: S) {
    wrap_text(text.as_ref(), terminal_columns())
        .into_iter()
        .for_each(|line| {
            println!("{}", line);
        });
}

/// Turn warnings stand out from the narrative.
pub(crate) fn display_warning<S: AsRef<str>>(text: S) {
    wrap_text(text.as_ref(), terminal_columns())
        .into_iter()
        .for_each(|line| {
            println!("{}", line.yellow());
        });
}

macro_rules! display {
    ($text:expr) => {{
        crate::io::display_text($text)
    }};

    ($fmt:expr, $($args:expr),+) => {{
        crate::io::display_text(format!($fmt, $($args),+))
    }};
}

pub(crate) use display;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_lines_wrap_at_column_limit() {
        let lines = wrap_text("the old mill stands by the river bend", 12);

        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.chars().count() <= 12));
    }

    #[test]
    fn display_works_as_a_match_arm() {
        let shown = |word: Option<&str>| match word {
            Some(word) => display!("word: {}", word),
            None => display!("nothing"),
        };

        let () = shown(Some("mill"));
        let () = shown(None);
    }
}
