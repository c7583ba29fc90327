// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! generic clean-up passes

use crate::pass::{Pass, PassList};
use crate::program::{BinaryOp, Op, Program, ValueId};
use hashbrown::{HashMap, HashSet};

fn constants(program: &Program) -> HashMap<ValueId, u32> {
    program
        .instructions
        .iter()
        .filter_map(|instruction| match (instruction.result, &instruction.op) {
            (Some(result), &Op::Constant(value)) => Some((result, value)),
            _ => None,
        })
        .collect()
}

/// evaluate arithmetic on constant operands
#[derive(Copy, Clone, Debug, Default)]
pub struct ConstantFold;

impl<C: ?Sized> Pass<C> for ConstantFold {
    fn name(&self) -> &'static str {
        "constant_fold"
    }
    fn run(&self, program: &mut Program, _context: &C) -> bool {
        let mut constants = constants(program);
        let mut changed = false;
        for instruction in &mut program.instructions {
            if let Op::Binary(op, lhs, rhs) = instruction.op {
                if let (Some(&lhs), Some(&rhs)) = (constants.get(&lhs), constants.get(&rhs)) {
                    let value = op.evaluate(lhs, rhs);
                    instruction.op = Op::Constant(value);
                    if let Some(result) = instruction.result {
                        constants.insert(result, value);
                    }
                    changed = true;
                }
            }
        }
        changed
    }
}

/// apply identities such as `x + 0 => x` and `x ^ x => 0`
#[derive(Copy, Clone, Debug, Default)]
pub struct AlgebraicSimplify;

fn simplify(op: BinaryOp, lhs: ValueId, rhs: ValueId, constants: &HashMap<ValueId, u32>) -> Option<Op> {
    let lhs_const = constants.get(&lhs).copied();
    let rhs_const = constants.get(&rhs).copied();
    match (op, lhs_const, rhs_const) {
        (BinaryOp::Add, _, Some(0))
        | (BinaryOp::Sub, _, Some(0))
        | (BinaryOp::Or, _, Some(0))
        | (BinaryOp::Xor, _, Some(0))
        | (BinaryOp::Shl, _, Some(0))
        | (BinaryOp::Shr, _, Some(0))
        | (BinaryOp::Mul, _, Some(1)) => Some(Op::Copy(lhs)),
        (BinaryOp::Add, Some(0), _)
        | (BinaryOp::Or, Some(0), _)
        | (BinaryOp::Xor, Some(0), _)
        | (BinaryOp::Mul, Some(1), _) => Some(Op::Copy(rhs)),
        (BinaryOp::Mul, Some(0), _)
        | (BinaryOp::Mul, _, Some(0))
        | (BinaryOp::And, Some(0), _)
        | (BinaryOp::And, _, Some(0)) => Some(Op::Constant(0)),
        (BinaryOp::Sub, _, _) | (BinaryOp::Xor, _, _) if lhs == rhs => Some(Op::Constant(0)),
        (BinaryOp::And, _, _) | (BinaryOp::Or, _, _) if lhs == rhs => Some(Op::Copy(lhs)),
        _ => None,
    }
}

impl<C: ?Sized> Pass<C> for AlgebraicSimplify {
    fn name(&self) -> &'static str {
        "algebraic_simplify"
    }
    fn run(&self, program: &mut Program, _context: &C) -> bool {
        let constants = constants(program);
        let mut changed = false;
        for instruction in &mut program.instructions {
            if let Op::Binary(op, lhs, rhs) = instruction.op {
                if let Some(new_op) = simplify(op, lhs, rhs, &constants) {
                    instruction.op = new_op;
                    changed = true;
                }
            }
        }
        changed
    }
}

/// replace uses of copies with the copied value
#[derive(Copy, Clone, Debug, Default)]
pub struct CopyPropagate;

impl<C: ?Sized> Pass<C> for CopyPropagate {
    fn name(&self) -> &'static str {
        "copy_propagate"
    }
    fn run(&self, program: &mut Program, _context: &C) -> bool {
        let mut sources: HashMap<ValueId, ValueId> = HashMap::new();
        for instruction in &program.instructions {
            if let (Some(result), &Op::Copy(source)) = (instruction.result, &instruction.op) {
                // instructions are in definition order so chains resolve here
                let source = sources.get(&source).copied().unwrap_or(source);
                sources.insert(result, source);
            }
        }
        if sources.is_empty() {
            return false;
        }
        let mut changed = false;
        for instruction in &mut program.instructions {
            if let Op::Copy(_) = instruction.op {
                continue;
            }
            instruction.op.visit_operands_mut(|operand| {
                if let Some(&source) = sources.get(operand) {
                    *operand = source;
                    changed = true;
                }
            });
        }
        changed
    }
}

/// remove instructions without side effects whose result is unused
#[derive(Copy, Clone, Debug, Default)]
pub struct DeadCodeEliminate;

impl<C: ?Sized> Pass<C> for DeadCodeEliminate {
    fn name(&self) -> &'static str {
        "dead_code_eliminate"
    }
    fn run(&self, program: &mut Program, _context: &C) -> bool {
        let mut used = HashSet::new();
        for instruction in &program.instructions {
            instruction.op.visit_operands(|v| {
                used.insert(v);
            });
        }
        let original_len = program.instructions.len();
        program.instructions.retain(|instruction| {
            instruction.op.has_side_effects()
                || instruction.result.map_or(false, |v| used.contains(&v))
        });
        program.instructions.len() != original_len
    }
}

/// the standard optimization loop body
pub fn optimization_passes<'a, C: ?Sized + 'a>() -> PassList<'a, C> {
    PassList::new()
        .with(ConstantFold)
        .with(AlgebraicSimplify)
        .with(CopyPropagate)
        .with(DeadCodeEliminate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimize(text: &str) -> String {
        let mut program = Program::parse(text).unwrap();
        let outcome = optimization_passes::<()>().run_to_fixed_point(&mut program, &(), 16);
        assert!(outcome.converged);
        program.to_string()
    }

    #[test]
    fn test_constant_fold() {
        let text = optimize(
            "shader vertex \"main\"\n\
             %0 = const 2\n\
             %1 = const 3\n\
             %2 = mul %0 %1\n\
             %3 = add %2 %0\n\
             store_output 8 %3\n",
        );
        assert_eq!(text, "shader vertex \"main\"\n%3 = const 8\nstore_output 8 %3\n");
    }

    #[test]
    fn test_simplify_and_propagate() {
        let text = optimize(
            "shader fragment \"main\"\n\
             %0 = load_input 8\n\
             %1 = const 0\n\
             %2 = add %0 %1\n\
             %3 = copy %2\n\
             %4 = xor %3 %3\n\
             %5 = or %3 %4\n\
             store_output 4 %5\n",
        );
        assert_eq!(
            text,
            "shader fragment \"main\"\n%0 = load_input 8\nstore_output 4 %0\n"
        );
    }

    #[test]
    fn test_side_effects_kept() {
        let text = optimize(
            "shader compute \"main\"\n\
             %0 = const 4\n\
             %1 = load shared %0\n\
             %2 = ray_query %0\n\
             barrier\n",
        );
        assert_eq!(
            text,
            "shader compute \"main\"\n%0 = const 4\n%2 = ray_query %0\nbarrier\n"
        );
    }
}
