//! Debugger application state and logic.

use std::collections::BTreeSet;

use crate::cpu::{ControlUnit, CpuError, Stage, Step, Tick};
use crate::isa::Instruction;

/// Clock cycles run per frame while running continuously.
const TICKS_PER_FRAME: usize = 64;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub cu: ControlUnit,
    /// Original program, kept for reset.
    pub program: Vec<Instruction>,
    /// Input stream, kept for reset.
    pub input: String,
    /// Breakpoints (by program counter).
    pub breakpoints: BTreeSet<usize>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset.
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger. The preload segment has already run when this returns.
    pub fn new(program: Vec<Instruction>, input: String) -> Result<Self, CpuError> {
        let cu = ControlUnit::new(program.clone(), input.chars())?;
        Ok(Self {
            cu,
            program,
            input,
            breakpoints: BTreeSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 't' to tick, 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
        })
    }

    /// Advance one stage.
    pub fn tick(&mut self) {
        let stage = self.cu.stage();
        match self.cu.tick() {
            Ok(Tick::Ran(cycles)) => {
                let plural = if cycles == 1 { "" } else { "s" };
                self.status = format!("{} ({} cycle{})", stage, cycles, plural);
            }
            Ok(Tick::Halted) => self.halted(),
            Err(e) => self.fault(e),
        }
    }

    /// Run the current instruction to completion.
    pub fn step(&mut self) {
        match self.cu.step() {
            Ok(Step::Executed { instruction, ticks }) => {
                self.status = format!("PC={:03}: {}  ({} ticks)", self.cu.pc(), instruction, ticks);
            }
            Ok(Step::Halted) => self.halted(),
            Err(e) => self.fault(e),
        }
    }

    /// Start continuous execution.
    pub fn run(&mut self) {
        if !self.cu.is_running() {
            self.status = format!("Machine stopped ({}). Press 'x' to reset.", self.cu.stage());
            return;
        }
        self.running = true;
        self.status = "Running...".into();
    }

    pub fn pause(&mut self) {
        self.running = false;
        self.status = "Paused.".into();
    }

    /// Run one frame of continuous execution, stopping at halt, faults and
    /// breakpoints. A breakpoint fires once its instruction has been fetched.
    pub fn run_frame(&mut self) {
        for _ in 0..TICKS_PER_FRAME {
            if !self.running {
                return;
            }
            self.tick();
            if self.cu.stage() == Stage::ArgumentFetch && self.breakpoints.contains(&self.cu.pc()) {
                self.running = false;
                self.status = format!("Breakpoint at PC={:03}", self.cu.pc());
            }
        }
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cu.pc();
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:03}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:03}", pc);
        }
    }

    /// Rebuild the machine from the original program and input.
    pub fn reset(&mut self) {
        self.running = false;
        match ControlUnit::new(self.program.clone(), self.input.chars()) {
            Ok(cu) => {
                self.cu = cu;
                self.status = "Reset. Ready.".into();
            }
            Err(e) => self.status = format!("Reset failed: {}", e),
        }
    }

    pub fn scroll_up(&mut self) {
        self.mem_scroll = self.mem_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        if self.mem_scroll + 1 < self.cu.ram().len() {
            self.mem_scroll += 1;
        }
    }

    /// Program listing around the current PC: (index, text, is_current).
    pub fn listing_window(&self, lines: usize) -> Vec<(usize, String, bool)> {
        let pc = self.cu.pc();
        let start = pc.saturating_sub(lines / 2);
        self.cu
            .program()
            .iter()
            .enumerate()
            .skip(start)
            .take(lines)
            .map(|(idx, instr)| (idx, instr.to_string(), idx == pc))
            .collect()
    }

    fn halted(&mut self) {
        self.running = false;
        self.status = format!(
            "Halted after {} ticks, {} instructions",
            self.cu.tick_count(),
            self.cu.instruction_count()
        );
    }

    fn fault(&mut self, e: CpuError) {
        self.running = false;
        self.status = format!("Error at PC={:03}: {}", self.cu.pc(), e);
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<Instruction>, input: String) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Build the machine before touching the terminal so bootstrap errors print normally.
    let mut app = DebuggerApp::new(program, input).map_err(std::io::Error::other)?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('t') => {
                            app.running = false;
                            app.tick();
                        }
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => app.pause(),
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_up(),
                        KeyCode::Down => app.scroll_down(),
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.run_frame();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
