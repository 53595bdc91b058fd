//! Statement traversal with an explicit accumulator.
//!
//! A [`Visitor`] sees each simple statement once, in source order, and
//! returns the new state to carry to the next statement. Compound
//! statements are never handed to the visitor; their nested blocks are
//! walked in the order they appear in the source.

use crate::ast::{Expr, Stmt, StmtKind};

pub trait Visitor {
    /// Value threaded through the traversal.
    type State;

    /// `targets = value` (all targets of a chained assignment).
    fn visit_assign(&mut self, _targets: &[Expr], _value: &Expr, state: Self::State) -> Self::State {
        state
    }

    /// A bare expression statement.
    fn visit_expr_stmt(&mut self, _expr: &Expr, state: Self::State) -> Self::State {
        state
    }

    /// Any other simple statement.
    fn visit_other(&mut self, _stmt: &Stmt, state: Self::State) -> Self::State {
        state
    }
}

/// Walk a block of statements.
pub fn walk_body<V: Visitor + ?Sized>(visitor: &mut V, body: &[Stmt], state: V::State) -> V::State {
    body.iter()
        .fold(state, |state, stmt| walk_stmt(visitor, stmt, state))
}

/// Walk a single statement, descending into nested blocks.
pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt, state: V::State) -> V::State {
    match &stmt.kind {
        StmtKind::Assign { targets, value } => visitor.visit_assign(targets, value, state),
        StmtKind::Expr(expr) => visitor.visit_expr_stmt(expr, state),

        StmtKind::ClassDef { body, .. } | StmtKind::FunctionDef { body, .. } => {
            walk_body(visitor, body, state)
        }
        StmtKind::If { body, orelse, .. }
        | StmtKind::For { body, orelse, .. }
        | StmtKind::While { body, orelse, .. } => {
            let state = walk_body(visitor, body, state);
            walk_body(visitor, orelse, state)
        }
        StmtKind::With { body, .. } => walk_body(visitor, body, state),
        StmtKind::Match { cases, .. } => cases
            .iter()
            .fold(state, |state, case| walk_body(visitor, &case.body, state)),
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            let state = walk_body(visitor, body, state);
            let state = handlers
                .iter()
                .fold(state, |state, handler| walk_body(visitor, &handler.body, state));
            let state = walk_body(visitor, orelse, state);
            walk_body(visitor, finalbody, state)
        }

        _ => visitor.visit_other(stmt, state),
    }
}
