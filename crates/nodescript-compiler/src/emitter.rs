//! Indented line buffer used to render program listings.

const INDENT: &str = "  ";

#[derive(Debug, Default)]
pub struct CodeBuilder {
    lines: Vec<String>,
    depth: usize,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one line at the current indentation.
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", INDENT.repeat(self.depth), text));
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.line("")
    }

    /// Emits `start`, the body one level deeper, then `end`.
    pub fn block(
        &mut self,
        start: impl AsRef<str>,
        end: impl AsRef<str>,
        body: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.line(start);
        self.depth += 1;
        body(self);
        self.depth -= 1;
        self.line(end)
    }

    /// Joins the buffer, dropping trailing blank lines.
    pub fn finish(mut self) -> String {
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Wraps a call expression in a suspension point when it is asynchronous.
pub fn compose(expr: &str, is_async: bool) -> String {
    if is_async {
        format!("await {expr}")
    } else {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_nest_indentation() {
        let mut code = CodeBuilder::new();
        code.block("fn a() {", "}", |code| {
            code.line("let x = 1;");
            code.block("if (x) {", "}", |code| {
                code.line("return x;");
            });
        });
        code.blank();
        assert_eq!(
            code.finish(),
            "fn a() {\n  let x = 1;\n  if (x) {\n    return x;\n  }\n}\n"
        );
    }

    #[test]
    fn compose_adds_await_only_when_async() {
        assert_eq!(compose("r1(params, ctx)", false), "r1(params, ctx)");
        assert_eq!(compose("r1(params, ctx)", true), "await r1(params, ctx)");
    }
}
