//! Ordered directive builder for filter-tool scripts.
//!
//! Script text stays the wire protocol to the shell, but compilation works on
//! [`Directive`]s so rule logic can be inspected without string matching.

use std::fmt;

/// Failure handling attached to a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Failure is ignored.
    BestEffort,
    /// `|| exit <code>`
    ExitCode(i32),
    /// `|| exit`, propagating the failing command's status.
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Comment(String),
    Command { line: String, guard: Guard },
    /// Verbatim shell text, such as the tool-discovery preamble.
    Raw(String),
}

impl Directive {
    fn render_into(&self, out: &mut String) {
        match self {
            Directive::Comment(text) => {
                out.push_str("# ");
                out.push_str(text);
                out.push('\n');
            }
            Directive::Command { line, guard } => {
                out.push_str(line);
                match guard {
                    Guard::BestEffort => {}
                    Guard::ExitCode(code) => {
                        out.push_str(" || exit ");
                        out.push_str(&code.to_string());
                    }
                    Guard::Bare => out.push_str(" || exit"),
                }
                out.push('\n');
            }
            Directive::Raw(block) => {
                out.push_str(block);
                if !block.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    directives: Vec<Directive>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comment(&mut self, text: impl Into<String>) -> &mut Self {
        self.directives.push(Directive::Comment(text.into()));
        self
    }

    pub fn guarded(&mut self, line: impl Into<String>, exit_code: i32) -> &mut Self {
        self.push_command(line, Guard::ExitCode(exit_code))
    }

    pub fn guarded_bare(&mut self, line: impl Into<String>) -> &mut Self {
        self.push_command(line, Guard::Bare)
    }

    pub fn best_effort(&mut self, line: impl Into<String>) -> &mut Self {
        self.push_command(line, Guard::BestEffort)
    }

    pub fn raw(&mut self, block: impl Into<String>) -> &mut Self {
        self.directives.push(Directive::Raw(block.into()));
        self
    }

    pub fn append(&mut self, other: Script) -> &mut Self {
        self.directives.extend(other.directives);
        self
    }

    fn push_command(&mut self, line: impl Into<String>, guard: Guard) -> &mut Self {
        self.directives.push(Directive::Command {
            line: line.into(),
            guard,
        });
        self
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Command lines without their guards, in order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.directives.iter().filter_map(|directive| match directive {
            Directive::Command { line, .. } => Some(line.as_str()),
            _ => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for directive in &self.directives {
            directive.render_into(&mut out);
        }
        out
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Quote `value` for a POSIX shell unless it is made of safe characters.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ':'));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
