//! Single-pass lowering from the syntax tree to a chunk.
//!
//! The compiler walks the tree once in evaluation order, tracking a stack of
//! scopes for the global-POP rule and loop bookkeeping. Forward jumps are
//! emitted with a zero operand and patched to the current instruction count.
//! String constants are allocated on the heap here; the pool stores the
//! resulting heap values, which stay rooted through the executing frame's
//! chunk once the program runs.

use std::rc::Rc;

use pebbl_ir::{
    BinaryOp, Expr, ForInStmt, FuncDecl, Program, Stmt, UnaryOp, WhileStmt,
};
use pebbl_runtime::{
    Chunk, FunctionProto, Heap, ManagedObject, OpCode, RuntimeError, Value, narrow_int_literal,
};

/// Hidden locals used by the for-in desugaring. `$` never appears in source
/// identifiers, so these cannot collide or be referenced by programs.
const ITER_SEQ: &str = "$iter";
const ITER_IDX: &str = "$idx";

/// Compile a program into an executable chunk.
pub fn compile(program: &Program, heap: &mut Heap) -> Result<Rc<Chunk>, RuntimeError> {
    let mut compiler = Compiler::new(heap);
    for stmt in program.statements.iter() {
        compiler.compile_stmt(stmt)?;
    }
    compiler.chunk.emit(OpCode::Halt);
    Ok(Rc::new(compiler.chunk))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScopeKind {
    Global,
    Function,
    Block,
    Loop,
}

struct Scope {
    kind: ScopeKind,
    loop_start: u32,
    loop_exit: u32,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            loop_start: 0,
            loop_exit: 0,
        }
    }
}

struct Compiler<'h> {
    chunk: Chunk,
    scopes: Vec<Scope>,
    heap: &'h mut Heap,
}

impl<'h> Compiler<'h> {
    fn new(heap: &'h mut Heap) -> Self {
        Self {
            chunk: Chunk::new(),
            scopes: vec![Scope::new(ScopeKind::Global)],
            heap,
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::Expr(e) => {
                self.compile_expr(e)?;
                // Top-level results stay visible (REPL rule); everything
                // else is discarded.
                if !self.at_global_scope() {
                    self.chunk.emit(OpCode::Pop);
                }
                Ok(())
            }
            Stmt::VarDecl(decl) => {
                self.compile_expr(&decl.value)?;
                let idx = self.chunk.add_name(&decl.name);
                let op = match decl.decl {
                    pebbl_ir::DeclKind::Let => OpCode::DefineConst,
                    pebbl_ir::DeclKind::Var => OpCode::DefineVar,
                };
                self.chunk.emit_with(op, idx);
                Ok(())
            }
            Stmt::FuncDecl(decl) => self.compile_func_decl(decl),
            Stmt::Return(value) => {
                match value {
                    Some(e) => self.compile_expr(e)?,
                    None => self.chunk.emit(OpCode::LoadNull),
                }
                self.chunk.emit(OpCode::Return);
                Ok(())
            }
            Stmt::Block(stmts) => self.compile_block(stmts),
            Stmt::While(w) => self.compile_while(w),
            Stmt::ForIn(f) => self.compile_for_in(f),
        }
    }

    /// A statement block gets a runtime scope of its own so definitions
    /// vanish on exit, matching the evaluator.
    fn compile_block(&mut self, stmts: &[Stmt]) -> Result<(), RuntimeError> {
        self.chunk.emit(OpCode::PushEnv);
        self.scopes.push(Scope::new(ScopeKind::Block));
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        self.scopes.pop();
        self.chunk.emit(OpCode::PopEnv);
        Ok(())
    }

    fn compile_while(&mut self, w: &WhileStmt) -> Result<(), RuntimeError> {
        self.scopes.push(Scope::new(ScopeKind::Loop));
        let loop_start = self.chunk.next_ip();
        self.current_scope().loop_start = loop_start;

        self.compile_expr(&w.cond)?;
        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.current_scope().loop_exit = exit_jump;

        self.compile_block(&w.body)?;
        let start = self.current_scope().loop_start;
        self.chunk.emit_with(OpCode::Jump, start);
        let exit = self.current_scope().loop_exit;
        self.patch_jump(exit);
        self.scopes.pop();
        Ok(())
    }

    /// For-in desugars to a counted loop over an iteration base: the array
    /// itself, or a snapshot of a dict's keys (IterPrep). The sequence and
    /// index live in hidden loop locals; the loop variable is defined once
    /// and stored on every iteration.
    fn compile_for_in(&mut self, f: &ForInStmt) -> Result<(), RuntimeError> {
        self.scopes.push(Scope::new(ScopeKind::Loop));
        self.chunk.emit(OpCode::PushEnv);

        self.compile_expr(&f.iterable)?;
        self.chunk.emit(OpCode::IterPrep);
        let seq = self.chunk.add_name(ITER_SEQ);
        self.chunk.emit_with(OpCode::DefineConst, seq);

        let zero = self.chunk.add_constant(Value::from_i32(0));
        self.chunk.emit_with(OpCode::LoadConst, zero);
        let idx = self.chunk.add_name(ITER_IDX);
        self.chunk.emit_with(OpCode::DefineVar, idx);

        self.chunk.emit(OpCode::LoadNull);
        let var = self.chunk.add_name(&f.var);
        self.chunk.emit_with(OpCode::DefineVar, var);

        let loop_start = self.chunk.next_ip();
        self.current_scope().loop_start = loop_start;

        self.chunk.emit_with(OpCode::LoadVar, idx);
        self.chunk.emit_with(OpCode::LoadVar, seq);
        self.chunk.emit(OpCode::Len);
        self.chunk.emit(OpCode::Less);
        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.current_scope().loop_exit = exit_jump;

        self.chunk.emit_with(OpCode::LoadVar, seq);
        self.chunk.emit_with(OpCode::LoadVar, idx);
        self.chunk.emit(OpCode::Index);
        self.chunk.emit_with(OpCode::StoreVar, var);
        self.chunk.emit(OpCode::Pop);

        self.compile_block(&f.body)?;

        let one = self.chunk.add_constant(Value::from_i32(1));
        self.chunk.emit_with(OpCode::LoadVar, idx);
        self.chunk.emit_with(OpCode::LoadConst, one);
        self.chunk.emit(OpCode::Add);
        self.chunk.emit_with(OpCode::StoreVar, idx);
        self.chunk.emit(OpCode::Pop);

        let start = self.current_scope().loop_start;
        self.chunk.emit_with(OpCode::Jump, start);
        let exit = self.current_scope().loop_exit;
        self.patch_jump(exit);
        self.chunk.emit(OpCode::PopEnv);
        self.scopes.pop();
        Ok(())
    }

    /// Compile the body into a fresh chunk, register the prototype, and
    /// close over the current environment at runtime. The function's name
    /// binds immutably.
    fn compile_func_decl(&mut self, decl: &FuncDecl) -> Result<(), RuntimeError> {
        let saved = std::mem::take(&mut self.chunk);
        self.scopes.push(Scope::new(ScopeKind::Function));
        // Parameters are bound by the call sequence; nothing to emit here.

        let body = &decl.body;
        let n = body.len();
        let mut has_trailing_expr = false;
        for (i, stmt) in body.iter().enumerate() {
            if i + 1 == n {
                if let Stmt::Expr(e) = stmt {
                    // Trailing expression statement is the implicit return
                    // value, so it skips the statement-level Pop.
                    self.compile_expr(e)?;
                    has_trailing_expr = true;
                    break;
                }
            }
            self.compile_stmt(stmt)?;
        }
        if !has_trailing_expr {
            self.chunk.emit(OpCode::LoadNull);
        }
        self.chunk.emit(OpCode::Return);

        self.scopes.pop();
        let func_chunk = std::mem::replace(&mut self.chunk, saved);
        let proto = Rc::new(FunctionProto {
            name: decl.name.clone(),
            params: decl.params.clone(),
            chunk: Rc::new(func_chunk),
        });
        let proto_idx = self.chunk.add_function(proto);
        self.chunk.emit_with(OpCode::MakeFunction, proto_idx);
        let name_idx = self.chunk.add_name(&decl.name);
        self.chunk.emit_with(OpCode::DefineConst, name_idx);
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), RuntimeError> {
        match expr {
            Expr::Int(i) => {
                let v = narrow_int_literal(*i)?;
                let idx = self.chunk.add_constant(v);
                self.chunk.emit_with(OpCode::LoadConst, idx);
            }
            Expr::Float(f) => {
                let idx = self.chunk.add_constant(Value::from_f64(*f));
                self.chunk.emit_with(OpCode::LoadConst, idx);
            }
            Expr::Str(s) => {
                let idx = self.add_string_constant(s);
                self.chunk.emit_with(OpCode::LoadConst, idx);
            }
            Expr::Bool(true) => self.chunk.emit(OpCode::LoadTrue),
            Expr::Bool(false) => self.chunk.emit(OpCode::LoadFalse),
            Expr::Nil => self.chunk.emit(OpCode::LoadNull),
            Expr::Ident(name) => {
                let idx = self.chunk.add_name(name);
                self.chunk.emit_with(OpCode::LoadVar, idx);
            }
            Expr::Array(elems) => {
                for e in elems.iter() {
                    self.compile_expr(e)?;
                }
                self.chunk.emit_with(OpCode::BuildArray, elems.len() as u32);
            }
            Expr::Dict(entries) => {
                for (k, v) in entries.iter() {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.chunk
                    .emit_with(OpCode::BuildDict, entries.len() as u32);
            }
            Expr::Unary { op, expr } => {
                self.compile_expr(expr)?;
                self.chunk.emit(match op {
                    UnaryOp::Neg => OpCode::Negate,
                    UnaryOp::Not => OpCode::Not,
                });
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => self.compile_and(left, right)?,
                BinaryOp::Or => self.compile_or(left, right)?,
                _ => {
                    self.compile_expr(left)?;
                    self.compile_expr(right)?;
                    self.chunk.emit(binary_opcode(*op));
                }
            },
            Expr::Assign(assign) => {
                self.compile_expr(&assign.value)?;
                let idx = self.chunk.add_name(&assign.target);
                // StoreVar leaves the value; the statement level pops it.
                self.chunk.emit_with(OpCode::StoreVar, idx);
            }
            Expr::If(ife) => {
                self.compile_expr(&ife.cond)?;
                let else_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.compile_expr(&ife.then_branch)?;
                let end_jump = self.emit_jump(OpCode::Jump);
                self.patch_jump(else_jump);
                match &ife.else_branch {
                    Some(alt) => self.compile_expr(alt)?,
                    None => self.chunk.emit(OpCode::LoadNull),
                }
                self.patch_jump(end_jump);
            }
            Expr::Call(call) => {
                self.compile_expr(&call.callee)?;
                for arg in call.args.iter() {
                    self.compile_expr(arg)?;
                }
                self.chunk.emit_with(OpCode::Call, call.args.len() as u32);
            }
            Expr::Index(ix) => {
                self.compile_expr(&ix.object)?;
                self.compile_expr(&ix.index)?;
                self.chunk.emit(OpCode::Index);
            }
        }
        Ok(())
    }

    /// `a and b` short-circuits: b is untouched when a is falsy. The result
    /// is always a bool.
    fn compile_and(&mut self, left: &Expr, right: &Expr) -> Result<(), RuntimeError> {
        self.compile_expr(left)?;
        let false_a = self.emit_jump(OpCode::JumpIfFalse);
        self.compile_expr(right)?;
        let false_b = self.emit_jump(OpCode::JumpIfFalse);
        self.chunk.emit(OpCode::LoadTrue);
        let end = self.emit_jump(OpCode::Jump);
        self.patch_jump(false_a);
        self.patch_jump(false_b);
        self.chunk.emit(OpCode::LoadFalse);
        self.patch_jump(end);
        Ok(())
    }

    fn compile_or(&mut self, left: &Expr, right: &Expr) -> Result<(), RuntimeError> {
        self.compile_expr(left)?;
        let true_a = self.emit_jump(OpCode::JumpIfTrue);
        self.compile_expr(right)?;
        let true_b = self.emit_jump(OpCode::JumpIfTrue);
        self.chunk.emit(OpCode::LoadFalse);
        let end = self.emit_jump(OpCode::Jump);
        self.patch_jump(true_a);
        self.patch_jump(true_b);
        self.chunk.emit(OpCode::LoadTrue);
        self.patch_jump(end);
        Ok(())
    }

    /// Emit a jump with a placeholder target and return its index for
    /// patching.
    fn emit_jump(&mut self, opcode: OpCode) -> u32 {
        let at = self.chunk.next_ip();
        self.chunk.emit_with(opcode, 0);
        at
    }

    /// Point the jump at `at` to the current instruction count.
    fn patch_jump(&mut self, at: u32) {
        let target = self.chunk.next_ip();
        self.chunk.patch_jump(at, target);
    }

    /// Intern a string constant: reuse an existing pool entry with the same
    /// content, otherwise allocate it on the heap.
    fn add_string_constant(&mut self, s: &str) -> u32 {
        for (i, c) in self.chunk.constants.iter().enumerate() {
            if c.is_gc_ptr() {
                if let ManagedObject::Str(existing) = self.heap.get(c.as_object_id()) {
                    if existing == s {
                        return i as u32;
                    }
                }
            }
        }
        let id = self.heap.alloc(ManagedObject::Str(s.to_string()));
        self.chunk.add_constant(Value::gc_ptr(id))
    }

    fn current_scope(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    fn at_global_scope(&self) -> bool {
        self.scopes
            .last()
            .is_some_and(|s| s.kind == ScopeKind::Global)
    }
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Subtract,
        BinaryOp::Mul => OpCode::Multiply,
        BinaryOp::Div => OpCode::Divide,
        BinaryOp::Eq => OpCode::Equal,
        BinaryOp::Ne => OpCode::NotEqual,
        BinaryOp::Lt => OpCode::Less,
        BinaryOp::Gt => OpCode::Greater,
        BinaryOp::Le => OpCode::LessEqual,
        BinaryOp::Ge => OpCode::GreaterEqual,
        // Lowered by compile_and / compile_or.
        BinaryOp::And | BinaryOp::Or => unreachable!("logical ops lower to jumps"),
    }
}
