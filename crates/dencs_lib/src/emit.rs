//! Emission driver: turns an operation sequence into a `Program` and a
//! `Program` into renderable text.
//!
//! Two terminal outcomes only: normal emission (globals block, prototypes,
//! bodies) or the degenerate stub, which guarantees syntactically complete
//! output for any input, including an empty one.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::Range;

use crate::analysis::{Shape, analyze_and_partition};
use crate::ast::{Command, CommandKind, Diagnostics, Program, Subroutine, SubroutineId};
use crate::ops::{OpKind, Operation, TypeTag};
use crate::translate::translate;

fn translate_range(ops: &[Operation], range: Range<usize>, trace: &mut Vec<String>) -> Vec<Command> {
    let end = range.end.min(ops.len());
    let start = range.start.min(end);
    let mut out = Vec::with_capacity(end - start);
    for i in start..end {
        let op = &ops[i];
        match translate(i, op) {
            Some(cmd) => out.push(cmd),
            None => {
                if op.kind.is_jump() && op.jump_target.is_none() {
                    trace.push(format!(
                        "unresolved {} at offset {:#06x} treated as no-op",
                        op.kind.mnemonic(),
                        op.offset
                    ));
                }
            }
        }
    }
    out
}

fn build_subroutine(
    ops: &[Operation],
    range: Range<usize>,
    id: i32,
    is_main: bool,
    return_type: TypeTag,
    trace: &mut Vec<String>,
) -> Subroutine {
    let start_offset = ops.get(range.start).map(|o| o.offset).unwrap_or(0);
    let mut commands = translate_range(ops, range, trace);
    let terminator = match commands.last() {
        Some(c) if c.is_return() => commands.pop(),
        _ => None,
    };
    Subroutine {
        id: SubroutineId::Index(id),
        return_type,
        is_main,
        start_offset,
        commands,
        terminator,
    }
}

/// Return types for discovered subroutines, inferred from reserve-slot
/// operations sitting immediately before their call sites (the same pattern
/// the entry stub uses). First call site wins on conflict.
fn inferred_return_types(ops: &[Operation]) -> HashMap<usize, TypeTag> {
    let mut types = HashMap::new();
    for (i, op) in ops.iter().enumerate() {
        if op.kind != OpKind::JumpSub {
            continue;
        }
        let Some(target) = op.jump_target else { continue };
        let Some(prev) = i.checked_sub(1).and_then(|p| ops.get(p)) else {
            continue;
        };
        if prev.kind == OpKind::ReserveSlot {
            if let Some(ty) = prev.value_type() {
                types.entry(target).or_insert(ty);
            }
        }
    }
    types
}

fn degenerate_stub() -> Subroutine {
    Subroutine {
        id: SubroutineId::Index(0),
        return_type: TypeTag::Void,
        is_main: true,
        start_offset: 0,
        commands: Vec::new(),
        terminator: Some(Command::new(0, CommandKind::Return { ty: TypeTag::Void })),
    }
}

/// The core pipeline: boundary analysis, partitioning, translation. Pure
/// over its input and infallible; any input yields some valid `Program`.
pub fn decompile_ops(ops: &[Operation]) -> Program {
    let (bounds, sub_ranges) = analyze_and_partition(ops);
    let mut trace = bounds.trace.clone();
    let mut globals = Vec::new();
    let mut subroutines = Vec::new();
    let mut next_id = 0;

    match bounds.shape {
        Shape::Library => {
            let inferred = inferred_return_types(ops);
            for range in bounds
                .library_functions
                .iter()
                .chain(sub_ranges.iter())
            {
                let ty = inferred
                    .get(&range.start)
                    .copied()
                    .unwrap_or(TypeTag::Void);
                subroutines.push(build_subroutine(
                    ops,
                    range.clone(),
                    next_id,
                    false,
                    ty,
                    &mut trace,
                ));
                next_id += 1;
            }
        }
        Shape::ScriptNoGlobals | Shape::ScriptWithGlobals { .. } => {
            if let Some(g) = &bounds.globals {
                globals = translate_range(ops, g.clone(), &mut trace);
            }
            if let Some(main) = &bounds.main {
                subroutines.push(build_subroutine(
                    ops,
                    main.clone(),
                    next_id,
                    true,
                    bounds.main_return,
                    &mut trace,
                ));
                next_id += 1;
            }
            let inferred = inferred_return_types(ops);
            for range in &sub_ranges {
                let ty = inferred
                    .get(&range.start)
                    .copied()
                    .unwrap_or(TypeTag::Void);
                subroutines.push(build_subroutine(
                    ops,
                    range.clone(),
                    next_id,
                    false,
                    ty,
                    &mut trace,
                ));
                next_id += 1;
            }
        }
    }

    let detected = subroutines.len();
    let typed = subroutines
        .iter()
        .filter(|s| s.return_type != TypeTag::Void)
        .count();

    // Degenerate when nothing at all was reconstructed: no subroutines, or
    // only empty ones with no terminators and no globals to show.
    let degenerate = subroutines.is_empty()
        || (globals.is_empty()
            && subroutines
                .iter()
                .all(|s| s.commands.is_empty() && s.terminator.is_none()));
    if degenerate {
        trace.push("nothing reconstructed, emitting stub entry function".to_string());
        subroutines = vec![degenerate_stub()];
    }

    Program {
        globals,
        subroutines,
        diagnostics: Diagnostics { detected, typed, degenerate, trace },
    }
}

fn render_command_line(out: &mut String, cmd: &Command) {
    let _ = writeln!(out, "    {:<36}; @{:04x}", cmd.to_string(), cmd.offset);
}

fn render_body(out: &mut String, sub: &Subroutine) {
    let _ = writeln!(
        out,
        "{} {}() {{",
        sub.return_type.keyword(),
        sub.display_name()
    );
    for cmd in &sub.commands {
        render_command_line(out, cmd);
    }
    if let Some(term) = &sub.terminator {
        render_command_line(out, term);
    }
    out.push_str("}\n");
}

fn render_degenerate(program: &Program) -> String {
    let mut out = String::new();
    out.push_str("// no program structure could be reconstructed\n");
    let _ = writeln!(
        out,
        "// subroutines detected: {}, typed: {}",
        program.diagnostics.detected, program.diagnostics.typed
    );
    for note in &program.diagnostics.trace {
        let _ = writeln!(out, "// {note}");
    }
    out.push_str("void main() {\n}\n");
    out
}

/// Renders the program in fixed order: header, globals block, prototypes,
/// then bodies. Falls back to the degenerate stub text when nothing
/// renderable was produced.
pub fn render_program(program: &Program) -> String {
    if program.subroutines.is_empty() || program.diagnostics.degenerate {
        return render_degenerate(program);
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "// subroutines detected: {}, typed: {}",
        program.diagnostics.detected, program.diagnostics.typed
    );

    if !program.globals.is_empty() {
        out.push_str("\nglobals {\n");
        for cmd in &program.globals {
            render_command_line(&mut out, cmd);
        }
        out.push_str("}\n");
    }

    let prototypes: Vec<&Subroutine> = program
        .subroutines
        .iter()
        .filter(|s| !s.is_main)
        .collect();
    if !prototypes.is_empty() {
        out.push('\n');
        for sub in &prototypes {
            let _ = writeln!(out, "{} {}();", sub.return_type.keyword(), sub.display_name());
        }
    }

    for sub in &program.subroutines {
        out.push('\n');
        render_body(&mut out, sub);
    }

    if out.trim().is_empty() {
        return render_degenerate(program);
    }
    out
}

/// Flat listing of the decoded operation stream, one operation per line.
pub fn disassemble(ops: &[Operation]) -> String {
    let mut out = String::new();
    for (i, op) in ops.iter().enumerate() {
        let _ = write!(out, "{:05} {:08x} {:<12}", i, op.offset, op.kind.mnemonic());
        if let Some(t) = op.jump_target {
            let _ = write!(out, " -> {t}");
        } else {
            for operand in &op.operands {
                let _ = write!(out, " {operand:?}");
            }
        }
        out.push('\n');
    }
    out
}
