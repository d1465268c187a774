use serde_json::Number;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
}

/// Assignment target: a variable followed by zero or more property/index steps.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Place {
    pub(crate) root: String,
    pub(crate) path: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathSegment {
    Key(String),
    Index(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Let {
        name: String,
        value: Option<Expr>,
        line: u32,
    },
    Assign {
        place: Place,
        value: Expr,
        line: u32,
    },
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        line: u32,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        line: u32,
    },
    ForOf {
        binding: String,
        iterable: Expr,
        body: Vec<Stmt>,
        line: u32,
    },
    Break {
        line: u32,
    },
    Continue {
        line: u32,
    },
    Return {
        value: Option<Expr>,
        line: u32,
    },
    Expr {
        expr: Expr,
        line: u32,
    },
}

impl Expr {
    /// Dotted name of a call target (`out`, `JSON.parse`), if the callee is a plain path.
    pub(crate) fn callee_path(&self) -> Option<String> {
        match self {
            Expr::Ident(name) => Some(name.clone()),
            Expr::Member { object, property } => {
                let mut path = object.callee_path()?;
                path.push('.');
                path.push_str(property);
                Some(path)
            }
            _ => None,
        }
    }
}

pub(crate) fn walk_stmts<E, F>(stmts: &[Stmt], visit: &mut F) -> Result<(), E>
where
    F: FnMut(&Expr, u32) -> Result<(), E>,
{
    for stmt in stmts {
        match stmt {
            Stmt::Let { value, line, .. } => {
                if let Some(value) = value {
                    walk_expr(value, *line, visit)?;
                }
            }
            Stmt::Assign { place, value, line } => {
                visit(&Expr::Ident(place.root.clone()), *line)?;
                for segment in &place.path {
                    if let PathSegment::Index(index) = segment {
                        walk_expr(index, *line, visit)?;
                    }
                }
                walk_expr(value, *line, visit)?;
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                line,
            } => {
                walk_expr(condition, *line, visit)?;
                walk_stmts(then_branch, visit)?;
                if let Some(else_branch) = else_branch {
                    walk_stmts(else_branch, visit)?;
                }
            }
            Stmt::While {
                condition,
                body,
                line,
            } => {
                walk_expr(condition, *line, visit)?;
                walk_stmts(body, visit)?;
            }
            Stmt::ForOf {
                iterable,
                body,
                line,
                ..
            } => {
                walk_expr(iterable, *line, visit)?;
                walk_stmts(body, visit)?;
            }
            Stmt::Return {
                value: Some(value),
                line,
            } => walk_expr(value, *line, visit)?,
            Stmt::Expr { expr, line } => walk_expr(expr, *line, visit)?,
            Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Return { value: None, .. } => {}
        }
    }
    Ok(())
}

fn walk_expr<E, F>(expr: &Expr, line: u32, visit: &mut F) -> Result<(), E>
where
    F: FnMut(&Expr, u32) -> Result<(), E>,
{
    visit(expr, line)?;
    match expr {
        Expr::Null | Expr::Bool(_) | Expr::Number(_) | Expr::String(_) | Expr::Ident(_) => {}
        Expr::Array(items) => {
            for item in items {
                walk_expr(item, line, visit)?;
            }
        }
        Expr::Object(entries) => {
            for (_, value) in entries {
                walk_expr(value, line, visit)?;
            }
        }
        Expr::Member { object, .. } => walk_expr(object, line, visit)?,
        Expr::Index { object, index } => {
            walk_expr(object, line, visit)?;
            walk_expr(index, line, visit)?;
        }
        Expr::Call { callee, args } => {
            walk_expr(callee, line, visit)?;
            for arg in args {
                walk_expr(arg, line, visit)?;
            }
        }
        Expr::Unary { operand, .. } => walk_expr(operand, line, visit)?,
        Expr::Binary { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
            walk_expr(lhs, line, visit)?;
            walk_expr(rhs, line, visit)?;
        }
        Expr::Conditional {
            condition,
            then_value,
            else_value,
        } => {
            walk_expr(condition, line, visit)?;
            walk_expr(then_value, line, visit)?;
            walk_expr(else_value, line, visit)?;
        }
    }
    Ok(())
}
