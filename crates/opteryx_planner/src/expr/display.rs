use std::fmt;

use super::{Expression, ExprKind};

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Identifier(ident) => match &ident.source {
                Some(source) => write!(f, "{source}.{}", ident.name),
                None => write!(f, "{}", ident.name),
            },
            ExprKind::Literal(value) => write!(f, "{value}"),
            ExprKind::Function { name } => write!(f, "{name}({})", format_params(&self.parameters)),
            ExprKind::Aggregator { name } => write!(f, "{name}({})", format_params(&self.parameters)),
            ExprKind::BinaryOp(op) => write!(
                f,
                "{} {} {}",
                fmt_child(&self.left),
                op.as_sql(),
                fmt_child(&self.right)
            ),
            ExprKind::ComparisonOp(op) => write!(
                f,
                "{} {} {}",
                fmt_child(&self.left),
                op.as_sql(),
                fmt_child(&self.right)
            ),
            ExprKind::UnaryOp(op) => write!(f, "{} {:?}", fmt_child(&self.left), op),
            ExprKind::And => write!(f, "{} AND {}", fmt_child(&self.left), fmt_child(&self.right)),
            ExprKind::Or => write!(f, "{} OR {}", fmt_child(&self.left), fmt_child(&self.right)),
            ExprKind::Xor => write!(f, "{} XOR {}", fmt_child(&self.left), fmt_child(&self.right)),
            ExprKind::Not => write!(f, "NOT {}", fmt_child(&self.centre)),
            ExprKind::Nested => write!(f, "({})", fmt_child(&self.centre)),
            ExprKind::Wildcard { qualifier } => match qualifier {
                Some(q) => write!(f, "{q}.*"),
                None => write!(f, "*"),
            },
            ExprKind::Subquery(_) => write!(f, "(SUBQUERY)"),
            ExprKind::ExpressionList => write!(f, "({})", format_params(&self.parameters)),
            ExprKind::Evaluated => write!(f, "<evaluated>"),
        }?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

fn fmt_child(child: &Option<Box<Expression>>) -> String {
    match child {
        Some(e) => format!("{e}"),
        None => String::new(),
    }
}

fn format_params(params: &[Expression]) -> String {
    params.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
}
