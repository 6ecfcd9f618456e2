//! Stages 1-3 of the dynamic-strategy pipeline (§4.9): integrity hash,
//! AST-level static analysis, and substring pattern check. Grounded on
//! `code_sanitizer.py`'s `ast.walk` shape, reimplemented over
//! `rustpython-parser`'s AST without ever executing the candidate source.

use rustpython_parser::{ast, Parse};
use sha2::{Digest, Sha256};

use crate::error::LoaderError;

/// Forbidden import roots (§6, exact).
pub const FORBIDDEN_IMPORTS: &[&str] = &[
    "os", "sys", "subprocess", "socket", "urllib", "requests", "http", "ftplib", "smtplib",
    "telnetlib", "pickle", "shelve", "marshal", "dill", "__builtin__", "builtins", "importlib",
    "ctypes", "cffi",
];

/// Forbidden built-in names in call position (§6, exact).
pub const FORBIDDEN_CALLS: &[&str] = &[
    "eval", "exec", "compile", "__import__", "open", "file", "input", "raw_input", "getattr",
    "setattr", "delattr", "hasattr", "globals", "locals", "vars", "dir",
];

/// Forbidden attribute names (§6, exact).
pub const FORBIDDEN_ATTRIBUTES: &[&str] = &[
    "__dict__", "__class__", "__bases__", "__subclasses__", "__code__", "__globals__",
    "__closure__",
];

/// Allow-listed import roots. Not specified exactly by §6 (only the
/// deny-list is exact); grounded on `code_sanitizer.py`'s
/// `ALLOWED_IMPORTS`, trimmed to what a Rust-hosted numerical strategy
/// callback plausibly needs (no `pandas` — panels are the column-store
/// type from this platform, not a DataFrame).
pub const ALLOWED_IMPORTS: &[&str] = &[
    "typing", "dataclasses", "enum", "abc", "collections", "itertools", "functools", "math",
    "statistics", "datetime", "numpy",
];

/// Forbidden substring groups (§6, exact), used by stage 3.
pub const FORBIDDEN_SUBSTRING_GROUPS: &[(&str, &[&str])] = &[
    (
        "filesystem",
        &[
            "open(", "pathlib", "Path(", "with open", "file(", "os.path", "glob.glob", "shutil",
        ],
    ),
    (
        "network",
        &[
            "socket", "urllib", "requests", "http.client", "ftplib", "smtplib", "telnetlib",
            "xmlrpc", "websocket", "aiohttp",
        ],
    ),
    (
        "system",
        &["os.system", "subprocess", "popen", "spawn", "call(", "check_output", "check_call"],
    ),
    (
        "database",
        &["psycopg2", "pymongo", "redis", "sqlite3", "sqlalchemy", "mysql", "cx_Oracle"],
    ),
];

/// Stage 1: verify `code`'s SHA-256 hash against the registry's
/// `code_hash` (hex-encoded) before anything else touches it.
pub fn verify_hash(code: &str, expected_hash_hex: &str) -> Result<(), LoaderError> {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    let actual = hex::encode(hasher.finalize());
    if actual != expected_hash_hex {
        return Err(LoaderError::HashMismatch {
            expected: expected_hash_hex.to_string(),
            actual,
        });
    }
    Ok(())
}

fn root_module(dotted: &str) -> &str {
    dotted.split('.').next().unwrap_or(dotted)
}

fn check_call(func: &ast::Expr) -> Result<(), LoaderError> {
    if let ast::Expr::Name(name) = func {
        let id = name.id.as_str();
        if FORBIDDEN_CALLS.contains(&id) {
            return Err(LoaderError::ForbiddenCall(id.to_string()));
        }
    }
    Ok(())
}

fn visit_expr(expr: &ast::Expr) -> Result<(), LoaderError> {
    match expr {
        ast::Expr::Call(call) => {
            check_call(&call.func)?;
            visit_expr(&call.func)?;
            for arg in &call.args {
                visit_expr(arg)?;
            }
            for kw in &call.keywords {
                visit_expr(&kw.value)?;
            }
        }
        ast::Expr::Attribute(attr) => {
            let name = attr.attr.as_str();
            if FORBIDDEN_ATTRIBUTES.contains(&name) {
                return Err(LoaderError::ForbiddenAttribute(name.to_string()));
            }
            visit_expr(&attr.value)?;
        }
        ast::Expr::BinOp(b) => {
            visit_expr(&b.left)?;
            visit_expr(&b.right)?;
        }
        ast::Expr::UnaryOp(u) => visit_expr(&u.operand)?,
        ast::Expr::BoolOp(b) => {
            for v in &b.values {
                visit_expr(v)?;
            }
        }
        ast::Expr::Compare(c) => {
            visit_expr(&c.left)?;
            for v in &c.comparators {
                visit_expr(v)?;
            }
        }
        ast::Expr::Subscript(s) => {
            visit_expr(&s.value)?;
            visit_expr(&s.slice)?;
        }
        ast::Expr::List(l) => {
            for e in &l.elts {
                visit_expr(e)?;
            }
        }
        ast::Expr::Tuple(t) => {
            for e in &t.elts {
                visit_expr(e)?;
            }
        }
        ast::Expr::Dict(d) => {
            for v in d.values.iter() {
                visit_expr(v)?;
            }
            for k in d.keys.iter().flatten() {
                visit_expr(k)?;
            }
        }
        ast::Expr::IfExp(i) => {
            visit_expr(&i.test)?;
            visit_expr(&i.body)?;
            visit_expr(&i.orelse)?;
        }
        _ => {}
    }
    Ok(())
}

fn visit_stmt(stmt: &ast::Stmt) -> Result<(), LoaderError> {
    match stmt {
        ast::Stmt::Import(import) => {
            for alias in &import.names {
                let root = root_module(alias.name.as_str());
                if FORBIDDEN_IMPORTS.contains(&root) {
                    return Err(LoaderError::ForbiddenImport(alias.name.to_string()));
                }
            }
        }
        ast::Stmt::ImportFrom(import) => {
            if let Some(module) = &import.module {
                let root = root_module(module.as_str());
                if FORBIDDEN_IMPORTS.contains(&root) {
                    return Err(LoaderError::ForbiddenImport(module.to_string()));
                }
            }
        }
        ast::Stmt::FunctionDef(f) => visit_stmts(&f.body)?,
        ast::Stmt::AsyncFunctionDef(f) => visit_stmts(&f.body)?,
        ast::Stmt::ClassDef(c) => visit_stmts(&c.body)?,
        ast::Stmt::If(i) => {
            visit_expr(&i.test)?;
            visit_stmts(&i.body)?;
            visit_stmts(&i.orelse)?;
        }
        ast::Stmt::For(f) => {
            visit_stmts(&f.body)?;
            visit_stmts(&f.orelse)?;
        }
        ast::Stmt::While(w) => {
            visit_expr(&w.test)?;
            visit_stmts(&w.body)?;
            visit_stmts(&w.orelse)?;
        }
        ast::Stmt::With(w) => {
            for item in &w.items {
                visit_expr(&item.context_expr)?;
            }
            visit_stmts(&w.body)?;
        }
        ast::Stmt::Try(t) => {
            visit_stmts(&t.body)?;
            for handler in &t.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                visit_stmts(&h.body)?;
            }
            visit_stmts(&t.orelse)?;
            visit_stmts(&t.finalbody)?;
        }
        ast::Stmt::Expr(e) => visit_expr(&e.value)?,
        ast::Stmt::Assign(a) => visit_expr(&a.value)?,
        ast::Stmt::AugAssign(a) => visit_expr(&a.value)?,
        ast::Stmt::AnnAssign(a) => {
            if let Some(v) = &a.value {
                visit_expr(v)?;
            }
        }
        ast::Stmt::Return(r) => {
            if let Some(v) = &r.value {
                visit_expr(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn visit_stmts(stmts: &[ast::Stmt]) -> Result<(), LoaderError> {
    for stmt in stmts {
        visit_stmt(stmt)?;
    }
    Ok(())
}

/// Stage 2: parse to an AST and walk it against the allow/deny lists
/// (§4.9, §6). The allow-list is informational only here — only the
/// deny-list rejects, matching §6's "any other value is rejected" being
/// reserved for rebalance codes, not imports; an unknown-but-not-denied
/// import is accepted but should be surfaced to a caller that wants a
/// stricter policy via [`unknown_imports`].
pub fn static_analysis(code: &str) -> Result<(), LoaderError> {
    let suite =
        ast::Suite::parse(code, "<strategy>").map_err(|e| LoaderError::SyntaxError(e.to_string()))?;
    visit_stmts(&suite)
}

/// Import roots present in `code` that are neither allow-listed nor
/// deny-listed — useful for a lenient-mode warning bucket.
pub fn unknown_imports(code: &str) -> Vec<String> {
    fn collect(stmts: &[ast::Stmt], out: &mut Vec<String>) {
        for stmt in stmts {
            match stmt {
                ast::Stmt::Import(import) => {
                    for alias in &import.names {
                        let root = root_module(alias.name.as_str()).to_string();
                        if !FORBIDDEN_IMPORTS.contains(&root.as_str())
                            && !ALLOWED_IMPORTS.contains(&root.as_str())
                        {
                            out.push(root);
                        }
                    }
                }
                ast::Stmt::ImportFrom(import) => {
                    if let Some(module) = &import.module {
                        let root = root_module(module.as_str()).to_string();
                        if !FORBIDDEN_IMPORTS.contains(&root.as_str())
                            && !ALLOWED_IMPORTS.contains(&root.as_str())
                        {
                            out.push(root);
                        }
                    }
                }
                ast::Stmt::FunctionDef(f) => collect(&f.body, out),
                ast::Stmt::ClassDef(c) => collect(&c.body, out),
                _ => {}
            }
        }
    }
    let mut out = Vec::new();
    if let Ok(suite) = ast::Suite::parse(code, "<strategy>") {
        collect(&suite, &mut out);
    }
    out
}

/// Stage 3: substring scan across the four forbidden groups (§4.9, §6).
/// In strict mode the first hit fails the load; in lenient mode every
/// hit is returned as a warning string and the caller decides.
pub fn pattern_check(code: &str, strict_mode: bool) -> Result<Vec<String>, LoaderError> {
    let mut warnings = Vec::new();
    for (group, patterns) in FORBIDDEN_SUBSTRING_GROUPS {
        for pattern in *patterns {
            if code.contains(pattern) {
                if strict_mode {
                    return Err(LoaderError::ForbiddenSubstring {
                        group: group.to_string(),
                        pattern: pattern.to_string(),
                    });
                }
                warnings.push(format!("{group}: {pattern}"));
            }
        }
    }
    Ok(warnings)
}
