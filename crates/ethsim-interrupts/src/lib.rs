//! Interrupt lines and a minimal level-triggered interrupt controller.
#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thiserror::Error;

/// Number of input lines on the controller.
pub const NUM_IRQ_LINES: u32 = 32;

/// A device's connection to its interrupt input.
///
/// Devices only ever drive the level; routing and priority are the controller's business.
pub trait IrqLine {
    fn set_level(&self, high: bool);
}

impl IrqLine for () {
    fn set_level(&self, _high: bool) {}
}

impl IrqLine for Rc<Cell<bool>> {
    fn set_level(&self, high: bool) {
        self.set(high);
    }
}

impl<T: IrqLine + ?Sized> IrqLine for Box<T> {
    fn set_level(&self, high: bool) {
        (**self).set_level(high);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupt line {line} out of range (controller has {} lines)", NUM_IRQ_LINES)]
pub struct InvalidIrqLine {
    pub line: u32,
}

/// Level-triggered controller with one pending bit per input.
#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    pending: u32,
    assertions: [u64; NUM_IRQ_LINES as usize],
}

pub type SharedInterruptController = Rc<RefCell<InterruptController>>;

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedInterruptController {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn set_level(&mut self, line: u32, high: bool) {
        debug_assert!(line < NUM_IRQ_LINES);
        let bit = 1u32 << line;
        if high {
            if self.pending & bit == 0 {
                tracing::trace!(line, "irq asserted");
            }
            self.pending |= bit;
            self.assertions[line as usize] += 1;
        } else {
            if self.pending & bit != 0 {
                tracing::trace!(line, "irq deasserted");
            }
            self.pending &= !bit;
        }
    }

    pub fn is_asserted(&self, line: u32) -> bool {
        line < NUM_IRQ_LINES && self.pending & (1 << line) != 0
    }

    /// Bitmask of asserted lines.
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// How many times `line` has been driven high since construction.
    pub fn assertion_count(&self, line: u32) -> u64 {
        self.assertions.get(line as usize).copied().unwrap_or(0)
    }
}

/// One input of a shared [`InterruptController`], handed to a device as its [`IrqLine`].
#[derive(Debug, Clone)]
pub struct ControllerLine {
    ctrl: SharedInterruptController,
    line: u32,
}

impl ControllerLine {
    pub fn new(ctrl: SharedInterruptController, line: u32) -> Result<Self, InvalidIrqLine> {
        if line >= NUM_IRQ_LINES {
            return Err(InvalidIrqLine { line });
        }
        Ok(Self { ctrl, line })
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl IrqLine for ControllerLine {
    fn set_level(&self, high: bool) {
        self.ctrl.borrow_mut().set_level(self.line, high);
    }
}
