//! Human-readable listing of a compiled program.
//!
//! The listing is a faithful rendering of the [`Program`]: one function per
//! node, one entry function per scope, an import per distinct module. It
//! shows `async fn` and `await` only for asynchronous scopes and `//`
//! comments only when asked to.

use nodescript_core::schema::SchemaSpec;
use serde_json::Value;

use crate::emitter::{compose, CodeBuilder};
use crate::program::{ArgExpr, LinkExpr, NodeUnit, Program, ScopeProgram, UnitBody};

pub fn render(program: &Program, comments: bool) -> String {
    let mut code = CodeBuilder::new();
    for (symbol, import) in &program.imports {
        code.line(format!("import {symbol} from {};", quote(&import.url)));
    }
    if !program.imports.is_empty() {
        code.blank();
    }

    for scope in program.scopes.values() {
        if comments && !scope.id.is_root() {
            code.line(format!("// scope {}", scope.id));
        }
        for symbol in &scope.units {
            if let Some(unit) = program.unit(symbol) {
                render_unit(&mut code, program, unit, comments);
                code.blank();
            }
        }
        render_entry(&mut code, scope);
        code.blank();
    }

    if let Some(map) = &program.node_map {
        code.block("export const nodeMap = {", "};", |code| {
            for (uid, symbol) in map {
                code.line(format!("{}: {symbol},", quote(uid.as_str())));
            }
        });
    }
    code.finish()
}

fn render_entry(code: &mut CodeBuilder, scope: &ScopeProgram) {
    let export = if scope.id.is_root() { "export " } else { "" };
    let head = format!(
        "{export}{} {}(params, ctx) {{",
        fn_keyword(scope.is_async),
        scope.symbol
    );
    code.block(head, "}", |code| match &scope.root {
        Some(root) => {
            let call = compose(&format!("{root}(params, ctx)"), scope.is_async);
            code.line(format!("return {call};"));
        }
        None => {
            code.line("return null;");
        }
    });
}

fn render_unit(code: &mut CodeBuilder, program: &Program, unit: &NodeUnit, comments: bool) {
    if comments {
        if unit.label.is_empty() {
            code.line(format!("// {}: {}", unit.uid, unit.reference));
        } else {
            code.line(format!("// {}: {} ({})", unit.uid, unit.label, unit.reference));
        }
    }
    let head = format!("{} {}(params, ctx) {{", fn_keyword(unit.is_async), unit.symbol);
    code.block(head, "}", |code| {
        if unit.cached {
            let start = format!("cache {} {{", quote(unit.uid.as_str()));
            code.block(start, "}", |code| render_introspected(code, program, unit));
        } else {
            render_introspected(code, program, unit);
        }
    });
}

fn render_introspected(code: &mut CodeBuilder, program: &Program, unit: &NodeUnit) {
    if program.introspect {
        let start = format!("introspect {} {{", quote(unit.uid.as_str()));
        code.block(start, "}", |code| render_body(code, program, unit));
    } else {
        render_body(code, program, unit);
    }
}

fn render_body(code: &mut CodeBuilder, program: &Program, unit: &NodeUnit) {
    if unit.body == UnitBody::Unresolved {
        code.line(format!("throw unresolved({});", quote(&unit.reference)));
        return;
    }
    code.line("let $p = {};");
    // Expanded sources are read in line order along with the other args.
    for (key, expr) in &unit.args {
        if !expr.contains_expanded() {
            code.line(format!("$p[{}] = {};", quote(key), render_arg(expr)));
            continue;
        }
        for symbol in expr.expanded_symbols() {
            let Some(line) = unit.expanded.iter().find(|l| l.symbol == symbol) else {
                continue;
            };
            let source = link_call(&line.source, "ctx");
            if line.upstream_expanded {
                code.line(format!("let {} = {source};", line.symbol));
            } else {
                code.line(format!("let {} = ctx.toArray({source});", line.symbol));
            }
        }
    }
    let call = invocation(program, unit);
    if !unit.is_expanding() {
        code.line(format!("return {call};"));
        return;
    }

    let lengths: Vec<String> = unit
        .expanded
        .iter()
        .map(|line| format!("{}.length", line.symbol))
        .collect();
    code.line(format!("let $l = min({});", lengths.join(", ")));
    code.line("let $r = [];");
    code.block("for ($i in 0..$l) {", "}", |code| {
        for (key, expr) in unit.args.iter().filter(|(_, e)| e.contains_expanded()) {
            code.line(format!("$p[{}] = {};", quote(key), render_arg(expr)));
        }
        code.line(format!("$r.push({call});"));
        if program.introspect {
            code.line("progress(($i + 1) / $l);");
        }
    });
    code.line("return $r;");
}

fn invocation(program: &Program, unit: &NodeUnit) -> String {
    match &unit.body {
        UnitBody::Param => "params[$p[\"key\"]]".to_string(),
        UnitBody::Local => "ctx.getLocal($p[\"key\"])".to_string(),
        UnitBody::Input | UnitBody::Output => "$p[\"value\"]".to_string(),
        UnitBody::Module { import, is_async } => {
            compose(&format!("{import}.compute($p, ctx)"), *is_async)
        }
        UnitBody::Subgraph { scope, is_async } => {
            let entry = program.scope(scope).map_or("null", |s| s.symbol.as_str());
            compose(&format!("{entry}($p, ctx.newScope($p))"), *is_async)
        }
        UnitBody::Unresolved => format!("unresolved({})", quote(&unit.reference)),
    }
}

fn render_arg(expr: &ArgExpr) -> String {
    match expr {
        ArgExpr::Literal(value) => value.to_string(),
        ArgExpr::Link(link) => link_expr(link, "ctx"),
        ArgExpr::Deferred(link) => {
            let arrow = if link.is_async { "async () =>" } else { "() =>" };
            let call = link_call(link, "ctx");
            match &link.convert {
                Some(schema) => format!("defer({arrow} {call}, {})", schema_json(schema)),
                None => format!("defer({arrow} {call})"),
            }
        }
        ArgExpr::Lambda(inner) => match inner.as_ref() {
            ArgExpr::Link(link) => {
                let arrow = if link.is_async { "async ($ctx) =>" } else { "($ctx) =>" };
                format!("lambda({arrow} {})", link_expr(link, "$ctx"))
            }
            other => format!("lambda(() => {})", render_arg(other)),
        },
        ArgExpr::Expanded { symbol, convert } => {
            let element = format!("{symbol}[$i]");
            match convert {
                Some(schema) => format!("ctx.convertType({element}, {})", schema_json(schema)),
                None => element,
            }
        }
        ArgExpr::Object(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(key, expr)| format!("{}: {}", quote(key), render_arg(expr)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        ArgExpr::Array(items) => {
            let items: Vec<String> = items.iter().map(render_arg).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

/// Upstream call with its projection, without conversion.
fn link_call(link: &LinkExpr, ctx: &str) -> String {
    let call = compose(&format!("{}(params, {ctx})", link.call), link.is_async);
    if link.link_key.is_empty() {
        call
    } else {
        format!("get({call}, {})", quote(&link.link_key))
    }
}

fn link_expr(link: &LinkExpr, ctx: &str) -> String {
    let call = link_call(link, ctx);
    match &link.convert {
        Some(schema) => format!("{ctx}.convertType({call}, {})", schema_json(schema)),
        None => call,
    }
}

fn fn_keyword(is_async: bool) -> &'static str {
    if is_async {
        "async fn"
    } else {
        "fn"
    }
}

fn quote(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

fn schema_json(schema: &SchemaSpec) -> String {
    serde_json::to_string(schema).unwrap_or_default()
}
