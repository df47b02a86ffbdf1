use std::io::Write;

use crate::Variable;

/// Formats a number with four significant digits, dropping trailing zeros.
fn label(value: f64) -> String {
    if value == 0. || !value.is_finite() {
        return value.to_string();
    }
    let exponent = value.abs().log10().floor() as i32;
    if (-4..4).contains(&exponent) {
        let text = format!("{:.*}", (3 - exponent) as usize, value);
        if text.contains('.') {
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            text
        }
    } else {
        let text = format!("{value:.3e}");
        match text.split_once('e') {
            Some((mantissa, exp)) if mantissa.contains('.') => format!(
                "{}e{exp}",
                mantissa.trim_end_matches('0').trim_end_matches('.')
            ),
            _ => text,
        }
    }
}

impl Variable {
    /// Write graphviz dot file to the given writer.
    ///
    /// Values are drawn as `a<id>` nodes, operators as separate `op<id>` nodes feeding the
    /// value they produced. Leaves that require grad are highlighted, and the edge out of an
    /// operator carries the gradient of its result.
    pub fn dot(&self, writer: &mut impl Write) -> std::io::Result<()> {
        self.clear_graph();
        writeln!(writer, "digraph G {{\nrankdir=\"LR\";")?;
        let res = self.draw(writer);
        self.clear_graph();
        res?;
        writeln!(writer, "}}")
    }

    fn draw(&self, writer: &mut impl Write) -> std::io::Result<()> {
        if self.set_visited(true) {
            return Ok(());
        }
        let id = self.id();
        if self.is_leaf() && self.requires_grad() {
            writeln!(
                writer,
                "a{id} [label=\"{}\", style=filled, fillcolor=lightblue];",
                label(self.data())
            )?;
        } else {
            writeln!(writer, "a{id} [label=\"{}\"];", label(self.data()))?;
        }
        if self.is_leaf() {
            return Ok(());
        }

        let op = self.op();
        writeln!(
            writer,
            "op{id} [label=\"{}\", style=filled, fillcolor=lightgreen];",
            op.name()
        )?;
        if self.requires_grad() {
            writeln!(writer, "op{id} -> a{id} [label=\"{}\"];", label(self.grad()))?;
        } else {
            writeln!(writer, "op{id} -> a{id};")?;
        }
        for operand in op.operands() {
            writeln!(writer, "a{} -> op{id};", operand.id())?;
            operand.draw(writer)?;
        }
        Ok(())
    }

    /// Clears the rendered marks left on this value and everything it depends on.
    pub fn clear_graph(&self) {
        if self.set_visited(false) {
            for operand in self.op().operands() {
                operand.clear_graph();
            }
        }
    }
}
