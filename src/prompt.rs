use std::io::{self, BufRead, Write};

/// Ask a yes/no question on the terminal.
///
/// Empty input answers `default`; with no default the question is repeated.
/// End of input counts as the default, or as "no".
pub fn prompt_confirm(question: &str, default: Option<bool>) -> io::Result<bool> {
    let hint = if default == Some(true) { "Y/n" } else { "y/N" };
    let stdin = io::stdin();
    let mut answer = String::new();

    loop {
        print!("{} ({}): ", question, hint);
        io::stdout().flush()?;

        answer.clear();
        if stdin.lock().read_line(&mut answer)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            "" if default.is_some() => return Ok(default.unwrap_or(false)),
            _ => {}
        }
    }
}
