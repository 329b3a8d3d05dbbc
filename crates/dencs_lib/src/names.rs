//! Best-effort recovery of well-known utility-routine names.
//!
//! Compiled scripts ship without debug symbols, but the small helpers the
//! stock compiler pastes into every script have recognizable bodies. A
//! registry of (signature, name) rules matches those bodies and replaces the
//! anonymous sequential identifier with the canonical name. Purely additive:
//! only the display identifier changes, never the commands.

use crate::ast::{Program, Subroutine, SubroutineId};

/// A body signature: every fragment must appear in the rendered command
/// text, and the body must stay under the command bound. Rules are matched
/// independently per subroutine, so registry order only breaks ties between
/// overlapping signatures.
#[derive(Debug, Clone, Copy)]
pub struct NameRule {
    pub name: &'static str,
    pub fragments: &'static [&'static str],
    pub max_commands: usize,
}

impl NameRule {
    pub fn matches(&self, body: &str, commands: usize) -> bool {
        commands <= self.max_commands && self.fragments.iter().all(|f| body.contains(f))
    }
}

static RULES: &[NameRule] = &[
    // int -> 0/1 normalization: compare against zero, branch, push either
    // constant
    NameRule {
        name: "IntToBool",
        fragments: &["CONST int 0", "BINARY ==", "JZ", "CONST int 1"],
        max_commands: 10,
    },
    // negate-if-negative
    NameRule {
        name: "AbsInt",
        fragments: &["CONST int 0", "BINARY <", "JZ", "UNARY -"],
        max_commands: 12,
    },
    // pick the larger of two stack slots
    NameRule {
        name: "MaxInt",
        fragments: &["BINARY >", "JZ", "CPDOWNSP"],
        max_commands: 14,
    },
];

pub fn builtin_rules() -> &'static [NameRule] {
    RULES
}

fn rendered_body(sub: &Subroutine) -> String {
    let mut out = String::new();
    for cmd in sub.commands.iter().chain(sub.terminator.iter()) {
        out.push_str(&cmd.to_string());
        out.push('\n');
    }
    out
}

/// Renames anonymously-numbered subroutines whose bodies match a registered
/// signature. Skips main and anything already named.
pub fn recover_names(program: &mut Program) {
    for sub in &mut program.subroutines {
        if sub.is_main || matches!(sub.id, SubroutineId::Named(_)) {
            continue;
        }
        let body = rendered_body(sub);
        let count = sub.commands.len() + usize::from(sub.terminator.is_some());
        if let Some(rule) = RULES.iter().find(|r| r.matches(&body, count)) {
            program
                .diagnostics
                .trace
                .push(format!("recovered name {} for {}", rule.name, sub.id));
            sub.id = SubroutineId::Named(rule.name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::emit::decompile_ops;
    use crate::ops::build::*;
    use crate::ops::{OpKind, TypeTag};

    fn cmp_zero() -> Vec<crate::ops::Operation> {
        // subroutine body at index 5: x == 0 ? 1 : 0
        let mut jz = op(OpKind::JumpIfZero);
        jz.jump_target = Some(9);
        numbered(vec![
            reserve(TypeTag::Int), // 0 stub
            jsr(3),                // 1
            retn(),                // 2
            action(1, 0),          // 3 main
            retn(),                // 4
            const_int(0),          // 5 subroutine: IntToBool shape
            op(OpKind::Equal),     // 6
            jz,                    // 7
            const_int(1),          // 8
            retn(),                // 9
        ])
    }

    #[test]
    fn known_body_gets_its_canonical_name() {
        let mut called = cmp_zero();
        // call the helper from main so the partitioner discovers it
        called[3] = {
            let mut c = op(OpKind::JumpSub);
            c.jump_target = Some(5);
            c.offset = 6;
            c
        };
        let mut program = decompile_ops(&called);
        recover_names(&mut program);
        let sub = program.subroutines.iter().find(|s| !s.is_main).unwrap();
        assert_eq!(sub.id, SubroutineId::Named("IntToBool".to_string()));
        assert!(program
            .diagnostics
            .trace
            .iter()
            .any(|t| t.contains("IntToBool")));
    }

    #[test]
    fn recovery_never_touches_commands_or_main() {
        let mut called = cmp_zero();
        called[3] = {
            let mut c = op(OpKind::JumpSub);
            c.jump_target = Some(5);
            c.offset = 6;
            c
        };
        let mut program = decompile_ops(&called);
        let before = program.clone();
        recover_names(&mut program);
        assert_eq!(before.globals, program.globals);
        assert_eq!(before.main(), program.main());
        for (a, b) in before.subroutines.iter().zip(&program.subroutines) {
            assert_eq!(a.commands, b.commands);
            assert_eq!(a.terminator, b.terminator);
            assert_eq!(a.return_type, b.return_type);
        }
    }

    #[test]
    fn unmatched_bodies_keep_their_index() {
        let ops = numbered(vec![
            reserve(TypeTag::Int), // 0 stub
            jsr(3),                // 1
            retn(),                // 2
            jsr(5),                // 3 main
            retn(),                // 4
            action(9, 4),          // 5 subroutine, matches nothing
            retn(),                // 6
        ]);
        let mut program = decompile_ops(&ops);
        recover_names(&mut program);
        let sub = program.subroutines.iter().find(|s| !s.is_main).unwrap();
        assert_eq!(sub.id, SubroutineId::Index(1));
    }

    #[test]
    fn rule_matching_is_fragment_and_length_bound() {
        let rule = NameRule {
            name: "x",
            fragments: &["ACTION 1"],
            max_commands: 2,
        };
        assert!(rule.matches("ACTION 1 #0\nRETN void\n", 2));
        assert!(!rule.matches("ACTION 1 #0\nRETN void\n", 3));
        assert!(!rule.matches("ACTION 2 #0\n", 1));
    }
}
