//! Boundary analysis over a decoded operation sequence.
//!
//! Classifies the input as a library or a script and computes the structural
//! index ranges (globals-init, entry stub, main body, library functions)
//! that the partitioner and translator consume. The analyzer never fails:
//! every ambiguity resolves to a documented fallback, recorded in the trace.

use std::collections::BTreeSet;
use std::ops::Range;

use crate::ops::{OpKind, Operation, TypeTag};

/// Classification outcome, computed once and consumed functionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Independently callable functions only, no entry point.
    Library,
    /// Entry stub (or bare body) with no global-initializer section.
    ScriptNoGlobals,
    /// Entry stub preceded by a globals section. `split` marks the
    /// degenerate layout where the true main body sits inside the candidate
    /// globals range and the split had to be redone.
    ScriptWithGlobals { split: bool },
}

/// Transient analyzer output. Consumed by the partitioner and the emission
/// driver, not persisted in the final AST.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryResult {
    pub shape: Shape,
    pub globals: Option<Range<usize>>,
    pub entry_stub: Option<Range<usize>>,
    pub main: Option<Range<usize>>,
    /// Return type inferred from the entry stub's reserve-slot variant.
    pub main_return: TypeTag,
    /// Resolved target of the entry stub's call, kept so the partitioner can
    /// tell main apart from ordinary subroutine targets even after fallback
    /// main placement.
    pub stub_target: Option<usize>,
    pub library_functions: Vec<Range<usize>>,
    pub trace: Vec<String>,
}

impl BoundaryResult {
    fn empty(shape: Shape) -> BoundaryResult {
        BoundaryResult {
            shape,
            globals: None,
            entry_stub: None,
            main: None,
            main_return: TypeTag::Void,
            stub_target: None,
            library_functions: Vec::new(),
            trace: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct EntryStub {
    range: Range<usize>,
    target: usize,
    return_type: TypeTag,
}

/// Matches the entry-stub pattern starting at `at`: an optional reserve-slot
/// operation, a subroutine call with a resolved target, then a return or a
/// restore-frame-pointer. A restore that opens the trailing
/// restore/move/return/return cleanup sequence is not a stub.
fn entry_stub_at(ops: &[Operation], at: usize) -> Option<EntryStub> {
    let mut i = at;
    let mut return_type = TypeTag::Void;
    if ops.get(i)?.kind == OpKind::ReserveSlot {
        return_type = ops[i].value_type().unwrap_or(TypeTag::Void);
        i += 1;
    }
    let call = ops.get(i)?;
    if call.kind != OpKind::JumpSub {
        return None;
    }
    let target = call.jump_target?;
    let tail = ops.get(i + 1)?;
    match tail.kind {
        OpKind::Return => {}
        OpKind::RestoreBp => {
            if is_trailing_cleanup(ops, i + 1) {
                return None;
            }
        }
        _ => return None,
    }
    Some(EntryStub {
        range: at..i + 2,
        target,
        return_type,
    })
}

/// RESTOREBP + MOVSP + RETN + RETN closing out the sequence is cleanup code
/// emitted after the real body, not an entry stub.
fn is_trailing_cleanup(ops: &[Operation], restore_at: usize) -> bool {
    restore_at + 3 == ops.len().saturating_sub(1)
        && ops[restore_at].kind == OpKind::RestoreBp
        && ops.get(restore_at + 1).is_some_and(|o| o.kind == OpKind::MoveSp)
        && ops.get(restore_at + 2).is_some_and(|o| o.kind == OpKind::Return)
        && ops.get(restore_at + 3).is_some_and(|o| o.kind == OpKind::Return)
}

fn is_operator(kind: OpKind) -> bool {
    matches!(
        kind,
        OpKind::LogicalAnd
            | OpKind::LogicalOr
            | OpKind::InclusiveOr
            | OpKind::ExclusiveOr
            | OpKind::BitwiseAnd
            | OpKind::Equal
            | OpKind::NotEqual
            | OpKind::GreaterEq
            | OpKind::Greater
            | OpKind::Less
            | OpKind::LessEq
            | OpKind::ShiftLeft
            | OpKind::ShiftRight
            | OpKind::UnsignedShiftRight
            | OpKind::Add
            | OpKind::Sub
            | OpKind::Mul
            | OpKind::Div
            | OpKind::Mod
            | OpKind::Negate
            | OpKind::Complement
            | OpKind::BooleanNot
    )
}

/// An operation that indicates real work rather than stack cleanup.
fn is_meaningful(op: &Operation) -> bool {
    matches!(
        op.kind,
        OpKind::Action | OpKind::JumpSub | OpKind::Jump | OpKind::JumpIfZero
            | OpKind::JumpIfNonZero | OpKind::Const
    ) || is_operator(op.kind)
}

fn has_internal_call_targets(ops: &[Operation]) -> bool {
    ops.iter().any(|o| {
        o.kind == OpKind::JumpSub && o.jump_target.is_some_and(|t| t < ops.len())
    })
}

/// Function end for a range starting at `start`: the next frame marker or
/// one past the next return, whichever comes first; end-of-sequence when
/// neither exists.
fn range_end(ops: &[Operation], start: usize, next_marker: usize) -> usize {
    let next_return = ops[start..]
        .iter()
        .position(|o| o.kind == OpKind::Return)
        .map(|p| start + p + 1)
        .unwrap_or(ops.len());
    next_return.min(next_marker).min(ops.len())
}

/// Scans the operation sequence once and computes its structural ranges.
/// Re-running on the same sequence always yields identical results.
pub fn analyze(ops: &[Operation]) -> BoundaryResult {
    let len = ops.len();
    if len == 0 {
        let mut b = BoundaryResult::empty(Shape::ScriptNoGlobals);
        b.trace.push("empty operation sequence".to_string());
        return b;
    }

    let markers: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, o)| o.kind == OpKind::SaveBp)
        .map(|(i, _)| i)
        .collect();
    // The last marker separates globals from callable code; earlier markers
    // belong to compound initializers.
    let boundary = markers.last().map(|&m| m + 1).unwrap_or(0).min(len);

    let mut trace = Vec::new();
    if markers.len() > 1 {
        trace.push(format!(
            "{} frame markers, globals boundary from the last at index {}",
            markers.len(),
            boundary - 1
        ));
    }

    let stub = entry_stub_at(ops, boundary);

    let library = if ops[0].kind == OpKind::SaveBp {
        trace.push("first operation is a frame marker".to_string());
        true
    } else if ops[0].kind == OpKind::Jump && markers.len() > 1 {
        trace.push("leading jump over multiple frame markers".to_string());
        true
    } else if markers.len() > 1 && stub.is_none() {
        trace.push("multiple frame markers and no entry stub".to_string());
        true
    } else if markers.len() == 1
        && stub.is_none()
        && ops[boundary..].iter().any(|o| o.kind == OpKind::Return)
    {
        trace.push("unwrapped functions after a single frame marker".to_string());
        true
    } else if markers.is_empty()
        && entry_stub_at(ops, 0).is_none()
        && has_internal_call_targets(ops)
    {
        trace.push("internal call targets with no entry stub".to_string());
        true
    } else {
        false
    };

    if library {
        let mut b = BoundaryResult::empty(Shape::Library);
        for (k, &m) in markers.iter().enumerate() {
            let next_marker = markers.get(k + 1).copied().unwrap_or(len);
            b.library_functions.push(m..range_end(ops, m, next_marker));
        }
        b.trace = trace;
        b.trace
            .push(format!("library with {} marked functions", b.library_functions.len()));
        return b;
    }

    let globals = (boundary > 0).then(|| 0..boundary);

    let Some(stub) = stub else {
        // No wrapper at all: everything after the globals boundary is main.
        trace.push(format!("no entry stub, main spans [{boundary}, {len})"));
        let shape = if globals.is_some() {
            Shape::ScriptWithGlobals { split: false }
        } else {
            Shape::ScriptNoGlobals
        };
        let mut b = BoundaryResult::empty(shape);
        b.globals = globals;
        b.main = Some(boundary.min(len)..len);
        b.trace = trace;
        return b;
    };

    let stub_end = stub.range.end.min(len);
    let target = stub.target;
    let mut entry_stub = Some(stub.range.clone());
    let mut globals = globals;
    let mut split = false;

    let main_start = if target >= stub_end && target < len && entry_stub_at(ops, target).is_none() {
        if target == len - 1 && ops[target].kind == OpKind::Return {
            // Stub calls straight into the trailing return. If everything
            // between the stub and that return is pure cleanup, the real
            // main body is buried in the candidate globals range.
            let interlude_meaningful = ops[stub_end..target].iter().any(is_meaningful);
            if interlude_meaningful {
                trace.push(
                    "stub targets the trailing return, using post-stub body as main".to_string(),
                );
                stub_end
            } else if let Some(first_action) = ops[..boundary]
                .iter()
                .position(|o| o.kind == OpKind::Action)
            {
                trace.push(format!(
                    "main body embedded in globals, re-splitting at index {first_action}"
                ));
                split = true;
                entry_stub = None;
                globals = (first_action > 0).then(|| 0..first_action);
                first_action
            } else {
                trace.push("stub targets the trailing return, no embedded main found".to_string());
                stub_end
            }
        } else {
            target
        }
    } else {
        // Out-of-range target or a target that is itself a stub (malformed
        // doubly-wrapped file): fall back to the position after the stub.
        trace.push(format!(
            "stub target {target} unusable as main start, falling back to {stub_end}"
        ));
        stub_end
    };

    let shape = if globals.is_some() || split {
        Shape::ScriptWithGlobals { split }
    } else {
        Shape::ScriptNoGlobals
    };
    let mut b = BoundaryResult::empty(shape);
    b.globals = globals;
    b.entry_stub = entry_stub;
    b.main = Some(main_start.min(len)..len);
    b.main_return = stub.return_type;
    b.stub_target = Some(target);
    b.trace = trace;
    b
}

/// Discovers every independently callable function besides the ranges the
/// analyzer already classified. Returns sorted, non-overlapping ranges.
pub fn partition_subroutines(ops: &[Operation], bounds: &BoundaryResult) -> Vec<Range<usize>> {
    let len = ops.len();
    let mut reserved: Vec<Range<usize>> = Vec::new();
    if let Some(g) = &bounds.globals {
        reserved.push(g.clone());
    }
    if let Some(s) = &bounds.entry_stub {
        reserved.push(s.clone());
    }
    reserved.extend(bounds.library_functions.iter().cloned());

    let main_start = bounds.main.as_ref().map(|m| m.start);

    let mut starts: BTreeSet<usize> = BTreeSet::new();
    for op in ops {
        if op.kind != OpKind::JumpSub {
            continue;
        }
        let Some(t) = op.jump_target else { continue };
        if t >= len {
            continue;
        }
        if Some(t) == main_start || Some(t) == bounds.stub_target {
            continue;
        }
        if reserved.iter().any(|r| r.contains(&t)) {
            continue;
        }
        starts.insert(t);
    }

    let starts: Vec<usize> = starts.into_iter().collect();
    let mut out = Vec::with_capacity(starts.len());
    for (k, &s) in starts.iter().enumerate() {
        let next_start = starts.get(k + 1).copied().unwrap_or(len);
        out.push(s..range_end(ops, s, next_start));
    }
    out
}

/// Runs the analyzer and the partitioner, then clips main at the first
/// discovered subroutine start past it.
pub fn analyze_and_partition(ops: &[Operation]) -> (BoundaryResult, Vec<Range<usize>>) {
    let mut bounds = analyze(ops);
    let subs = partition_subroutines(ops, &bounds);
    if let Some(main) = &mut bounds.main {
        if let Some(clip) = subs
            .iter()
            .map(|r| r.start)
            .filter(|&s| s > main.start && s < main.end)
            .min()
        {
            bounds
                .trace
                .push(format!("main clipped at subroutine start {clip}"));
            main.end = clip;
        }
    }
    (bounds, subs)
}
