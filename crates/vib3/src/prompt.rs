use std::io::{self, BufRead, IsTerminal, Write};

/// Yes/no confirmation source.
pub(crate) trait Confirm {
    /// Ask the user to confirm an action, which is declined by default.
    fn confirm(&self, question: &str) -> io::Result<bool>;
}

/// [`Confirm`] implementation that asks the user in the terminal.
///
/// Interactive terminals get a `dialoguer` prompt, while piped
/// input is read as a single line instead.
pub(crate) struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        if io::stdin().is_terminal() && io::stdout().is_terminal() {
            Ok(dialoguer::Confirm::new()
                .with_prompt(question)
                .default(false)
                .interact()
                .map_err(|dialoguer::Error::IO(err)| err)?)
        } else {
            confirm_line(question, &mut io::stdin().lock(), &mut io::stdout())
        }
    }
}

/// Ask `question` in `out` and read the answer from a single `input` line.
///
/// Only `y` and `yes` are accepted, ignoring case. End of input declines.
fn confirm_line(question: &str, input: &mut impl BufRead, out: &mut impl Write) -> io::Result<bool> {
    write!(out, "{question} (y/N): ")?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;

    let answer = answer.trim();

    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}
