//! The control unit.
//!
//! A three-stage cycle drives the datapath one signal group at a time:
//!
//! ```text
//! InstructionFetch -> ArgumentFetch -> Execute -> InstructionFetch -> ...
//!                                         |
//!                                         +-> Halted (HLT)
//! ```
//!
//! Each call to [`ControlUnit::tick`] runs one stage (or one sub-step of
//! argument fetch) and reports how many clock cycles it consumed. Argument
//! fetch takes 0 cycles for immediate or missing operands, 1 for direct and
//! 2 for indirect addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cpu::datapath::Datapath;
use crate::cpu::memory::Ram;
use crate::cpu::registers::{bool_to_word, Flags, OperandSource, PcSelect};
use crate::cpu::CpuError;
use crate::isa::{AddressingMode, Instruction, Opcode, Word};

/// Stage of the instruction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    InstructionFetch,
    ArgumentFetch,
    Execute,
    /// HLT executed. Terminal.
    Halted,
    /// A fault aborted the run. Terminal.
    Faulted,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::InstructionFetch => "INSTR_FETCH",
            Stage::ArgumentFetch => "ARG_FETCH",
            Stage::Execute => "EXECUTION",
            Stage::Halted => "HALTED",
            Stage::Faulted => "FAULTED",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Result of one [`ControlUnit::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A stage ran and consumed this many clock cycles (0 or 1).
    Ran(u64),
    /// The machine is halted; nothing was dispatched.
    Halted,
}

/// Result of one [`ControlUnit::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An instruction went through the whole cycle.
    Executed { instruction: Instruction, ticks: u64 },
    /// The machine is halted.
    Halted,
}

/// Per-tick view of the machine, used for traces and the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub stage: Stage,
    pub acc: Word,
    pub pc: usize,
    pub address: Word,
    pub operand: Word,
    pub bus: Word,
    pub negative: bool,
    pub zero: bool,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TICK: {:5} STAGE: {:11} ACC: {:10} PC: {:3} DATA_ADDR: {:10} ARG: {:10} DATA_BUS: {:10} N|Z: {}|{}",
            self.tick,
            self.stage,
            self.acc,
            self.pc,
            self.address,
            self.operand,
            self.bus,
            u8::from(self.negative),
            u8::from(self.zero),
        )
    }
}

/// The control unit and the datapath it drives.
#[derive(Debug, Clone)]
pub struct ControlUnit {
    datapath: Datapath,
    program: Vec<Instruction>,
    pc: usize,
    stage: Stage,
    /// Sub-step within argument fetch.
    arg_step: u8,
    operand_source: OperandSource,
    pc_select: PcSelect,
    flags: Flags,
    tick_count: u64,
    instruction_count: u64,
}

impl ControlUnit {
    /// Build a machine for `program`, feeding it `input`.
    ///
    /// A leading preload segment is run to completion here, before the
    /// machine is handed out. Afterwards only the program segment remains,
    /// the program counter points before its first instruction and the
    /// counters are zero.
    pub fn new(
        program: Vec<Instruction>,
        input: impl IntoIterator<Item = char>,
    ) -> Result<Self, CpuError> {
        validate_program(&program)?;

        let mut cu = Self {
            datapath: Datapath::new(input),
            program,
            pc: 0,
            stage: Stage::InstructionFetch,
            arg_step: 0,
            operand_source: OperandSource::Literal,
            // The first fetch lands on instruction 0.
            pc_select: PcSelect::Jump(0),
            flags: Flags::new(),
            tick_count: 0,
            instruction_count: 0,
        };
        cu.bootstrap()?;
        Ok(cu)
    }

    fn bootstrap(&mut self) -> Result<(), CpuError> {
        match self.program.first().map(Instruction::opcode) {
            Some(Opcode::Preload) => {
                while !(self.stage == Stage::ArgumentFetch
                    && self.current()?.opcode() == Opcode::ProgramStart)
                {
                    if self.tick()? == Tick::Halted {
                        return Err(CpuError::BootstrapHalted);
                    }
                }
                tracing::debug!(
                    ticks = self.tick_count,
                    instructions = self.instruction_count,
                    cells = self.datapath.ram().len(),
                    "preload finished"
                );
                self.enter_program(self.pc + 1);
            }
            Some(Opcode::ProgramStart) => self.enter_program(1),
            _ => {}
        }
        Ok(())
    }

    /// Drop everything before `start` and reset the cycle to the new entry point.
    fn enter_program(&mut self, start: usize) {
        let _ = self.program.drain(..start);
        self.pc = 0;
        self.pc_select = PcSelect::Jump(0);
        self.operand_source = OperandSource::Literal;
        self.stage = Stage::InstructionFetch;
        self.arg_step = 0;
        self.flags = Flags::new();
        self.tick_count = 0;
        self.instruction_count = 0;
    }

    /// Advance one stage.
    pub fn tick(&mut self) -> Result<Tick, CpuError> {
        match self.stage {
            Stage::Halted => return Ok(Tick::Halted),
            Stage::Faulted => return Err(CpuError::NotRunning(self.stage)),
            _ => {}
        }
        tracing::trace!("{}", self.snapshot());

        let result = match self.stage {
            Stage::InstructionFetch => self.instruction_fetch(),
            Stage::ArgumentFetch => self.argument_fetch(),
            Stage::Execute => self.execute(),
            stage => Err(CpuError::InternalLogicFault(format!(
                "dispatch in terminal stage {}",
                stage
            ))),
        };

        match result {
            Ok(Tick::Ran(cycles)) => {
                self.tick_count += cycles;
                Ok(Tick::Ran(cycles))
            }
            Ok(Tick::Halted) => Ok(Tick::Halted),
            Err(e) => {
                tracing::debug!(pc = self.pc, error = %e, "machine faulted");
                self.stage = Stage::Faulted;
                Err(e)
            }
        }
    }

    /// Tick until the current instruction has gone through the whole cycle.
    pub fn step(&mut self) -> Result<Step, CpuError> {
        let mut ticks = 0;
        let mut executed = None;
        loop {
            if self.stage == Stage::Execute {
                executed = Some(self.current()?);
            }
            match self.tick()? {
                Tick::Halted => return Ok(Step::Halted),
                Tick::Ran(cycles) => ticks += cycles,
            }
            if let (Stage::InstructionFetch, Some(instruction)) = (self.stage, executed) {
                return Ok(Step::Executed { instruction, ticks });
            }
        }
    }

    /// Run until HLT. Returns the clock cycles consumed by this call.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start = self.tick_count;
        while self.tick()? != Tick::Halted {}
        Ok(self.tick_count - start)
    }

    /// Run until HLT or until `max_ticks` clock cycles have passed.
    pub fn run_limited(&mut self, max_ticks: u64) -> Result<u64, CpuError> {
        let start = self.tick_count;
        let limit = start.saturating_add(max_ticks);
        while self.tick_count < limit {
            if self.tick()? == Tick::Halted {
                break;
            }
        }
        Ok(self.tick_count - start)
    }

    // ==================== Stages ====================

    fn instruction_fetch(&mut self) -> Result<Tick, CpuError> {
        self.datapath.set_acc_drives_bus(false)?;
        self.datapath.set_output_enable(false)?;
        self.datapath.set_write(false)?;
        self.latch_pc()?;
        let instr = self.current()?;
        tracing::debug!(pc = self.pc, instr = %instr, "fetched");

        self.pc_select = PcSelect::Increment;
        self.operand_source = OperandSource::Literal;
        self.next_stage(Stage::ArgumentFetch);
        Ok(Tick::Ran(1))
    }

    fn argument_fetch(&mut self) -> Result<Tick, CpuError> {
        let instr = self.current()?;
        if instr.skips_argument_fetch() {
            tracing::trace!("argument fetch skipped");
            self.next_stage(Stage::Execute);
            return Ok(Tick::Ran(0));
        }

        match (self.arg_step, instr.mode()) {
            (0, AddressingMode::Direct | AddressingMode::Indirect) => {
                self.datapath.latch_address(self.resolved_operand(&instr))?;
                self.operand_source = OperandSource::Bus;
                self.datapath.set_output_enable(true)?;
                if instr.mode() == AddressingMode::Indirect {
                    self.arg_step += 1;
                } else {
                    self.next_stage(Stage::Execute);
                }
                Ok(Tick::Ran(1))
            }
            (1, AddressingMode::Indirect) => {
                // Output-enable is still asserted, so the pointer target is
                // read onto the bus as soon as the address settles.
                self.datapath.latch_address(self.resolved_operand(&instr))?;
                self.next_stage(Stage::Execute);
                Ok(Tick::Ran(1))
            }
            (step, mode) => Err(CpuError::InternalLogicFault(format!(
                "illegal combination of argument fetch step {} and {} addressing",
                step, mode
            ))),
        }
    }

    fn execute(&mut self) -> Result<Tick, CpuError> {
        let instr = self.current()?;
        let operand = self.resolved_operand(&instr);
        let acc = i128::from(self.datapath.acc());
        let arg = i128::from(operand);

        let result = match instr.opcode() {
            Opcode::Preload | Opcode::ProgramStart => None,
            Opcode::Halt => {
                tracing::debug!(pc = self.pc, ticks = self.tick_count, "halted");
                self.instruction_count += 1;
                self.stage = Stage::Halted;
                return Ok(Tick::Halted);
            }

            Opcode::Increment => Some(acc + 1),
            Opcode::Decrement => Some(acc - 1),
            Opcode::Add => Some(acc + arg),
            Opcode::Sub => Some(acc - arg),
            Opcode::Mul => Some(acc * arg),
            Opcode::Div => Some(floor_div(acc, arg)?),
            Opcode::Rem => Some(floor_rem(acc, arg)?),
            Opcode::And => Some(acc & arg),
            Opcode::Or => Some(acc | arg),
            Opcode::Negate => Some(-acc),
            Opcode::LogicalNot => Some(i128::from(bool_to_word(acc == 0))),
            Opcode::SetIfGreater => Some(i128::from(bool_to_word(self.flags.greater()))),
            Opcode::SetIfLess => Some(i128::from(bool_to_word(self.flags.less()))),
            Opcode::SetIfEqual => Some(i128::from(bool_to_word(self.flags.equal()))),
            Opcode::Load => Some(arg),

            Opcode::Compare => {
                self.flags.set_from(acc - arg);
                None
            }
            Opcode::Store => {
                self.store(&instr, operand)?;
                None
            }
            Opcode::Jump => {
                self.pc_select = PcSelect::Jump(operand);
                None
            }
            Opcode::JumpIfZero => {
                if self.flags.zero {
                    self.pc_select = PcSelect::Jump(operand);
                }
                None
            }
            Opcode::JumpIfNonZero => {
                if !self.flags.zero {
                    self.pc_select = PcSelect::Jump(operand);
                }
                None
            }
        };

        if let Some(value) = result {
            self.flags.set_from(value);
            // Keep the low word; flags above saw the full result.
            self.datapath.set_pending_acc(value as Word);
            self.datapath.latch_accumulator();
        }

        self.instruction_count += 1;
        self.next_stage(Stage::InstructionFetch);
        Ok(Tick::Ran(1))
    }

    /// Drive the accumulator into the effective address of a store.
    fn store(&mut self, instr: &Instruction, operand: Word) -> Result<(), CpuError> {
        let target = match instr.mode() {
            AddressingMode::Immediate => operand,
            // Argument fetch left the effective address in the latch.
            AddressingMode::Direct | AddressingMode::Indirect => self.datapath.address(),
        };
        self.datapath.latch_address(target)?;
        self.datapath.set_output_enable(false)?;
        self.datapath.set_acc_drives_bus(true)?;
        self.datapath.set_write(true)
    }

    // ==================== Helpers ====================

    fn latch_pc(&mut self) -> Result<(), CpuError> {
        self.pc = match self.pc_select {
            PcSelect::Increment => self.pc + 1,
            PcSelect::Jump(target) => {
                usize::try_from(target).map_err(|_| CpuError::ProgramCounterOutOfRange {
                    pc: target,
                    len: self.program.len(),
                })?
            }
        };
        Ok(())
    }

    fn next_stage(&mut self, stage: Stage) {
        self.stage = stage;
        self.arg_step = 0;
    }

    fn current(&self) -> Result<Instruction, CpuError> {
        self.program
            .get(self.pc)
            .copied()
            .ok_or(CpuError::ProgramCounterOutOfRange {
                pc: self.pc as Word,
                len: self.program.len(),
            })
    }

    fn resolved_operand(&self, instr: &Instruction) -> Word {
        match self.operand_source {
            OperandSource::Literal => instr.operand().unwrap_or(0),
            OperandSource::Bus => self.datapath.read_bus(),
        }
    }

    // ==================== Inspection ====================

    /// Current state as a trace record.
    pub fn snapshot(&self) -> Snapshot {
        let operand = self
            .current_instruction()
            .map(|instr| self.resolved_operand(instr))
            .unwrap_or(0);
        Snapshot {
            tick: self.tick_count,
            stage: self.stage,
            acc: self.datapath.acc(),
            pc: self.pc,
            address: self.datapath.address(),
            operand,
            bus: self.datapath.read_bus(),
            negative: self.flags.negative,
            zero: self.flags.zero,
        }
    }

    /// The instruction under the program counter, if any.
    pub fn current_instruction(&self) -> Option<&Instruction> {
        self.program.get(self.pc)
    }

    /// The program segment being executed.
    pub fn program(&self) -> &[Instruction] {
        &self.program
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn acc(&self) -> Word {
        self.datapath.acc()
    }

    pub fn bus(&self) -> Word {
        self.datapath.read_bus()
    }

    /// Latched memory address.
    pub fn address(&self) -> Word {
        self.datapath.address()
    }

    pub fn ram(&self) -> &Ram {
        self.datapath.ram()
    }

    /// Direct RAM access, bypassing the bus. Meant for loaders and tests.
    pub fn ram_mut(&mut self) -> &mut Ram {
        self.datapath.ram_mut()
    }

    /// Output produced so far.
    pub fn output(&self) -> &str {
        self.datapath.output()
    }

    /// Input not consumed yet.
    pub fn remaining_input(&self) -> String {
        self.datapath.remaining_input()
    }

    /// Clock cycles since the program segment started.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Instructions completed since the program segment started.
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn is_halted(&self) -> bool {
        self.stage == Stage::Halted
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.stage, Stage::Halted | Stage::Faulted)
    }
}

impl fmt::Display for ControlUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.snapshot(), f)
    }
}

/// Check the marker layout: an optional `preload:` first, followed by
/// exactly one `program:`.
fn validate_program(program: &[Instruction]) -> Result<(), CpuError> {
    let positions = |op: Opcode| -> Vec<usize> {
        program
            .iter()
            .enumerate()
            .filter(|(_, instr)| instr.opcode() == op)
            .map(|(i, _)| i)
            .collect()
    };
    let preload = positions(Opcode::Preload);
    let start = positions(Opcode::ProgramStart);

    if program.is_empty() {
        return Err(CpuError::InvalidProgram("empty program".into()));
    }
    match preload.as_slice() {
        [] | [0] => {}
        _ => {
            return Err(CpuError::InvalidProgram(
                "preload: may only appear once, as the first instruction".into(),
            ))
        }
    }
    if start.len() > 1 {
        return Err(CpuError::InvalidProgram("program: appears more than once".into()));
    }
    if !preload.is_empty() && start.is_empty() {
        return Err(CpuError::InvalidProgram("preload: without a following program:".into()));
    }
    Ok(())
}

/// Integer division rounding toward negative infinity.
fn floor_div(a: i128, b: i128) -> Result<i128, CpuError> {
    if b == 0 {
        return Err(CpuError::DivisionByZero);
    }
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Remainder matching [`floor_div`]; takes the sign of the divisor.
fn floor_rem(a: i128, b: i128) -> Result<i128, CpuError> {
    if b == 0 {
        return Err(CpuError::DivisionByZero);
    }
    let r = a % b;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}
