//! Syntax-tree builders for tests. The parser is external to this
//! workspace, so test programs are constructed directly.

#![allow(dead_code)]

use pebbl_ir::*;

pub fn program(stmts: Vec<Stmt>) -> Program {
    Program {
        statements: stmts.into_boxed_slice(),
    }
}

pub fn int(i: i64) -> Expr {
    Expr::Int(i)
}

pub fn flt(f: f64) -> Expr {
    Expr::Float(f)
}

pub fn s(v: &str) -> Expr {
    Expr::Str(v.to_string())
}

pub fn boolean(v: bool) -> Expr {
    Expr::Bool(v)
}

pub fn nil() -> Expr {
    Expr::Nil
}

pub fn ident(name: &str) -> Expr {
    Expr::Ident(name.to_string())
}

pub fn array(items: Vec<Expr>) -> Expr {
    Expr::Array(items.into_boxed_slice())
}

pub fn dict(entries: Vec<(Expr, Expr)>) -> Expr {
    Expr::Dict(entries.into_boxed_slice())
}

pub fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn unary(op: UnaryOp, expr: Expr) -> Expr {
    Expr::Unary {
        op,
        expr: Box::new(expr),
    }
}

pub fn assign(target: &str, value: Expr) -> Expr {
    Expr::Assign(Box::new(AssignExpr {
        target: target.to_string(),
        value,
    }))
}

pub fn if_expr(cond: Expr, then_branch: Expr, else_branch: Option<Expr>) -> Expr {
    Expr::If(Box::new(IfExpr {
        cond,
        then_branch,
        else_branch,
    }))
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call(Box::new(CallExpr {
        callee,
        args: args.into_boxed_slice(),
    }))
}

pub fn call_name(name: &str, args: Vec<Expr>) -> Expr {
    call(ident(name), args)
}

pub fn index(object: Expr, idx: Expr) -> Expr {
    Expr::Index(Box::new(IndexExpr { object, index: idx }))
}

pub fn expr(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

pub fn let_(name: &str, value: Expr) -> Stmt {
    Stmt::VarDecl(Box::new(VarDecl {
        name: name.to_string(),
        value,
        decl: DeclKind::Let,
    }))
}

pub fn var_(name: &str, value: Expr) -> Stmt {
    Stmt::VarDecl(Box::new(VarDecl {
        name: name.to_string(),
        value,
        decl: DeclKind::Var,
    }))
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return(value)
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::Block(stmts.into_boxed_slice())
}

pub fn while_(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While(Box::new(WhileStmt {
        cond,
        body: body.into_boxed_slice(),
    }))
}

pub fn for_in(var: &str, iterable: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::ForIn(Box::new(ForInStmt {
        var: var.to_string(),
        iterable,
        body: body.into_boxed_slice(),
    }))
}

pub fn func(name: &str, params: Vec<&str>, body: Vec<Stmt>) -> Stmt {
    Stmt::FuncDecl(Box::new(FuncDecl {
        name: name.to_string(),
        params: params
            .into_iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .into_boxed_slice(),
        body: body.into_boxed_slice(),
    }))
}
