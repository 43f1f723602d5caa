use std::io::{self, BufRead, Write};

/// Phrase required before destructive operations in production
pub const CONFIRMATION_PHRASE: &str = "YES I UNDERSTAND";

/// Interactive prompt utilities for CLI commands
pub struct Prompt;

impl Prompt {
    /// Ask a yes/no question, re-asking until the answer is understood.
    /// An empty answer or end of input picks `default`.
    pub fn confirm<R: BufRead, W: Write>(
        input: &mut R,
        output: &mut W,
        message: &str,
        default: bool,
    ) -> io::Result<bool> {
        let default_str = if default { "Y/n" } else { "y/N" };

        loop {
            write!(output, "{} [{}]: ", message, default_str)?;
            output.flush()?;

            let mut answer = String::new();
            if input.read_line(&mut answer)? == 0 {
                return Ok(default);
            }

            match answer.trim().to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(output, "Please enter 'y' or 'n'")?,
            }
        }
    }

    /// Ask the user to type `phrase` exactly
    pub fn confirm_phrase<R: BufRead, W: Write>(
        input: &mut R,
        output: &mut W,
        message: &str,
        phrase: &str,
    ) -> io::Result<bool> {
        write!(output, "{}: ", message)?;
        output.flush()?;

        let mut answer = String::new();
        input.read_line(&mut answer)?;
        Ok(answer.trim() == phrase)
    }
}
