use accsim::cpu::{ControlUnit, Stage, Step, Tick};
use accsim::isa::instruction::Arity;
use accsim::isa::INPUT_PORT;
use accsim::{AddressingMode, Instruction, Opcode, Word};
use proptest::prelude::*;

/// Operand-taking opcodes whose execution cannot fault on any operand.
const TOTAL_OPS: [Opcode; 7] = [
    Opcode::Load,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::And,
    Opcode::Or,
    Opcode::Compare,
];

/// Opcodes that write the accumulator.
const ACC_OPS: [Opcode; 10] = [
    Opcode::Load,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::And,
    Opcode::Or,
    Opcode::Negate,
    Opcode::LogicalNot,
    Opcode::Increment,
    Opcode::Decrement,
];

fn mode() -> impl Strategy<Value = AddressingMode> {
    prop_oneof![
        Just(AddressingMode::Immediate),
        Just(AddressingMode::Direct),
        Just(AddressingMode::Indirect),
    ]
}

/// Addresses in plain RAM, below the I/O ports.
fn ram_addr() -> impl Strategy<Value = Word> {
    0..INPUT_PORT
}

fn machine(program: Vec<Instruction>) -> ControlUnit {
    ControlUnit::new(program, "".chars()).unwrap()
}

fn with_operand(op: Opcode, operand: Word) -> Instruction {
    match op.arity() {
        Arity::None => Instruction::bare(op).unwrap(),
        _ => Instruction::immediate(op, operand).unwrap(),
    }
}

proptest! {
    #[test]
    fn argument_fetch_ticks_follow_addressing_mode(
        op in prop::sample::select(TOTAL_OPS.to_vec()),
        mode in mode(),
        operand in ram_addr(),
    ) {
        let instr = Instruction::new(op, Some(operand), mode).unwrap();
        let mut cu = machine(vec![instr, Instruction::bare(Opcode::Halt).unwrap()]);

        prop_assert_eq!(cu.tick().unwrap(), Tick::Ran(1));
        prop_assert_eq!(cu.stage(), Stage::ArgumentFetch);

        let mut fetch_ticks = 0;
        while cu.stage() == Stage::ArgumentFetch {
            match cu.tick().unwrap() {
                Tick::Ran(cycles) => fetch_ticks += cycles,
                Tick::Halted => prop_assert!(false, "halted during argument fetch"),
            }
        }
        let expected = match mode {
            AddressingMode::Immediate => 0,
            AddressingMode::Direct => 1,
            AddressingMode::Indirect => 2,
        };
        prop_assert_eq!(fetch_ticks, expected);
        prop_assert_eq!(cu.stage(), Stage::Execute);
    }

    #[test]
    fn flags_match_the_accumulator(
        op in prop::sample::select(ACC_OPS.to_vec()),
        a in -1_000_000_000i64..1_000_000_000,
        b in -1_000_000_000i64..1_000_000_000,
    ) {
        let mut cu = machine(vec![
            Instruction::immediate(Opcode::Load, a).unwrap(),
            with_operand(op, b),
            Instruction::bare(Opcode::Halt).unwrap(),
        ]);
        cu.run().unwrap();

        let flags = cu.flags();
        prop_assert_eq!(flags.zero, cu.acc() == 0);
        prop_assert_eq!(flags.negative, cu.acc() < 0);
    }

    #[test]
    fn compare_flags_order_operands(
        a in any::<i64>(),
        b in any::<i64>(),
    ) {
        let mut cu = machine(vec![
            Instruction::immediate(Opcode::Load, a).unwrap(),
            Instruction::immediate(Opcode::Compare, b).unwrap(),
            Instruction::bare(Opcode::Halt).unwrap(),
        ]);
        cu.run().unwrap();

        let flags = cu.flags();
        prop_assert_eq!(flags.equal(), a == b);
        prop_assert_eq!(flags.less(), a < b);
        prop_assert_eq!(flags.greater(), a > b);
        prop_assert_eq!(cu.acc(), a);
    }

    #[test]
    fn store_jump_and_halt_keep_flags(
        a in any::<i64>(),
        addr in ram_addr(),
        op in prop::sample::select(vec![
            Opcode::Store,
            Opcode::Jump,
            Opcode::JumpIfZero,
            Opcode::JumpIfNonZero,
            Opcode::Halt,
        ]),
    ) {
        let second = match op {
            Opcode::Store => Instruction::immediate(op, addr).unwrap(),
            Opcode::Halt => Instruction::bare(op).unwrap(),
            _ => Instruction::immediate(op, 2).unwrap(),
        };
        let mut cu = machine(vec![
            Instruction::immediate(Opcode::Load, a).unwrap(),
            second,
            Instruction::bare(Opcode::Halt).unwrap(),
        ]);

        let executed = matches!(cu.step().unwrap(), Step::Executed { .. });
        prop_assert!(executed);
        let before = cu.flags();
        cu.run().unwrap();
        prop_assert_eq!(cu.flags(), before);
    }

    #[test]
    fn division_rounds_toward_negative_infinity(
        a in -1_000_000i64..1_000_000,
        b in prop_oneof![-1_000i64..0, 1i64..1_000],
    ) {
        let run = |op| {
            let mut cu = machine(vec![
                Instruction::immediate(Opcode::Load, a).unwrap(),
                Instruction::immediate(op, b).unwrap(),
                Instruction::bare(Opcode::Halt).unwrap(),
            ]);
            cu.run().unwrap();
            cu.acc()
        };
        let q = run(Opcode::Div);
        let r = run(Opcode::Rem);

        prop_assert_eq!(q * b + r, a);
        prop_assert!(r.abs() < b.abs());
        prop_assert!(r == 0 || (r < 0) == (b < 0));
    }

    #[test]
    fn load_then_store_leaves_ram_unchanged(
        cells in prop::collection::btree_map(ram_addr(), any::<i64>(), 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let addr = *pick.get(&cells.keys().copied().collect::<Vec<_>>());
        let mut cu = machine(vec![
            Instruction::direct(Opcode::Load, addr).unwrap(),
            Instruction::direct(Opcode::Store, addr).unwrap(),
            Instruction::bare(Opcode::Halt).unwrap(),
        ]);
        for (&a, &v) in &cells {
            cu.ram_mut().write(a, v);
        }
        let before = cu.ram().dump();

        cu.run().unwrap();
        prop_assert_eq!(cu.ram().dump(), before);
        prop_assert_eq!(cu.acc(), cells[&addr]);
    }
}
