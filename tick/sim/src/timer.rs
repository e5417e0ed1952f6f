//! Simulated 16-bit timer peripheral.

use std::cell::RefCell;
use std::collections::VecDeque;

use log::trace;
use tick_core::{CaptureInput, CaptureMode, ClockSource, IrqSource, TimerHardware};

#[derive(Debug, Clone, Copy)]
struct Channel {
    ccr: u16,
    interrupt: bool,
    flag: bool,
    overrun: bool,
    mode: CaptureMode,
    input: CaptureInput,
    level: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            ccr: 0,
            interrupt: false,
            flag: false,
            overrun: false,
            mode: CaptureMode::Compare,
            input: CaptureInput::A,
            level: false,
        }
    }
}

#[derive(Debug)]
struct Registers {
    counter: u16,
    overflow_flag: bool,
    overflow_interrupt: bool,
    running: bool,
    source: ClockSource,
    divider_shift: u8,
    channels: Vec<Channel>,
    glitches: VecDeque<u16>,
    free_running: bool,
}

impl Registers {
    fn step(&mut self) {
        if !self.running {
            return;
        }
        self.counter = self.counter.wrapping_add(1);
        if self.counter == 0 {
            self.overflow_flag = true;
        }
        let counter = self.counter;
        for (idx, ch) in self.channels.iter_mut().enumerate() {
            if ch.mode == CaptureMode::Compare && ch.ccr == counter {
                trace!("sim: compare match on channel {idx} at {counter:#06x}");
                ch.flag = true;
            }
        }
    }
}

/// A timer that advances only when [`SimTimer::tick`] is called.
///
/// Compare channels raise their flag when the counter steps onto the
/// compare value. Capture channels latch the counter on matching edges
/// fed through [`SimTimer::edge`].
#[derive(Debug)]
pub struct SimTimer {
    regs: RefCell<Registers>,
}

impl SimTimer {
    /// Creates a running timer with `channels` capture/compare channels
    /// clocked from the auxiliary clock.
    pub fn new(channels: u8) -> Self {
        Self::with_source(channels, ClockSource::Auxiliary, 0)
    }

    pub fn with_source(channels: u8, source: ClockSource, divider_shift: u8) -> Self {
        Self {
            regs: RefCell::new(Registers {
                counter: 0,
                overflow_flag: false,
                overflow_interrupt: false,
                running: true,
                source,
                divider_shift,
                channels: vec![Channel::default(); channels as usize],
                glitches: VecDeque::new(),
                free_running: false,
            }),
        }
    }

    /// Advances the counter by one tick if running.
    pub fn tick(&self) {
        self.regs.borrow_mut().step();
    }

    /// When set, every counter read advances the timer by one tick, so
    /// code that polls the clock makes progress on its own.
    pub fn set_free_running(&self, enabled: bool) {
        self.regs.borrow_mut().free_running = enabled;
    }

    /// Advances the counter by `n` ticks without servicing interrupts.
    pub fn advance(&self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Drives the capture input of `channel` to `level`.
    pub fn edge(&self, channel: u8, level: bool) {
        let mut regs = self.regs.borrow_mut();
        let counter = regs.counter;
        let Some(ch) = regs.channels.get_mut(channel as usize) else {
            return;
        };
        let previous = ch.level;
        ch.level = level;
        let triggered = match ch.mode {
            CaptureMode::Compare => false,
            CaptureMode::Rising => !previous && level,
            CaptureMode::Falling => previous && !level,
            CaptureMode::Both => previous != level,
        };
        if triggered {
            if ch.flag {
                ch.overrun = true;
            }
            ch.ccr = counter;
            ch.flag = true;
        }
    }

    /// Makes the next counter read return `counter + offset`, as an
    /// unsynchronized read of an asynchronous timer can.
    pub fn inject_read_glitch(&self, offset: u16) {
        self.regs.borrow_mut().glitches.push_back(offset);
    }

    /// True when an enabled interrupt source has its flag set.
    pub fn interrupt_pending(&self) -> bool {
        let regs = self.regs.borrow();
        (regs.overflow_interrupt && regs.overflow_flag)
            || regs.channels.iter().any(|ch| ch.interrupt && ch.flag)
    }

    pub fn overflow_interrupt_enabled(&self) -> bool {
        self.regs.borrow().overflow_interrupt
    }

    pub fn capture_mode(&self, channel: u8) -> CaptureMode {
        self.regs.borrow().channels[channel as usize].mode
    }

    /// Raises the overflow flag without moving the counter.
    pub fn raise_overflow(&self) {
        self.regs.borrow_mut().overflow_flag = true;
    }
}

impl TimerHardware for SimTimer {
    fn channel_count(&self) -> u8 {
        self.regs.borrow().channels.len() as u8
    }

    fn counter(&self) -> u16 {
        let mut regs = self.regs.borrow_mut();
        if regs.free_running {
            regs.step();
        }
        let offset = regs.glitches.pop_front().unwrap_or(0);
        regs.counter.wrapping_add(offset)
    }

    fn set_counter(&self, value: u16) {
        self.regs.borrow_mut().counter = value;
    }

    fn overflow_flag(&self) -> bool {
        self.regs.borrow().overflow_flag
    }

    fn clear_overflow_flag(&self) {
        self.regs.borrow_mut().overflow_flag = false;
    }

    fn set_overflow_interrupt(&self, enabled: bool) {
        self.regs.borrow_mut().overflow_interrupt = enabled;
    }

    fn is_running(&self) -> bool {
        self.regs.borrow().running
    }

    fn halt(&self) {
        self.regs.borrow_mut().running = false;
    }

    fn resume(&self) {
        self.regs.borrow_mut().running = true;
    }

    fn clock_source(&self) -> ClockSource {
        self.regs.borrow().source
    }

    fn divider_shift(&self) -> u8 {
        self.regs.borrow().divider_shift
    }

    fn set_compare(&self, channel: u8, value: u16) {
        self.regs.borrow_mut().channels[channel as usize].ccr = value;
    }

    fn compare(&self, channel: u8) -> u16 {
        self.regs.borrow().channels[channel as usize].ccr
    }

    fn set_channel_interrupt(&self, channel: u8, enabled: bool) {
        self.regs.borrow_mut().channels[channel as usize].interrupt = enabled;
    }

    fn channel_interrupt_enabled(&self, channel: u8) -> bool {
        self.regs.borrow().channels[channel as usize].interrupt
    }

    fn channel_flag(&self, channel: u8) -> bool {
        self.regs.borrow().channels[channel as usize].flag
    }

    fn set_channel_flag(&self, channel: u8) {
        self.regs.borrow_mut().channels[channel as usize].flag = true;
    }

    fn clear_channel_flag(&self, channel: u8) {
        self.regs.borrow_mut().channels[channel as usize].flag = false;
    }

    fn capture_overrun(&self, channel: u8) -> bool {
        self.regs.borrow().channels[channel as usize].overrun
    }

    fn clear_capture_overrun(&self, channel: u8) {
        self.regs.borrow_mut().channels[channel as usize].overrun = false;
    }

    fn configure_capture(&self, channel: u8, mode: CaptureMode, input: CaptureInput) {
        let mut regs = self.regs.borrow_mut();
        let ch = &mut regs.channels[channel as usize];
        ch.mode = mode;
        ch.input = input;
        match input {
            CaptureInput::Ground => ch.level = false,
            CaptureInput::Supply => ch.level = true,
            CaptureInput::A | CaptureInput::B => {}
        }
    }

    fn capture_input(&self, channel: u8) -> bool {
        self.regs.borrow().channels[channel as usize].level
    }

    fn latch_counter(&self, channel: u8) -> u16 {
        let mut regs = self.regs.borrow_mut();
        let counter = regs.counter;
        regs.channels[channel as usize].ccr = counter;
        counter
    }

    fn take_pending(&self) -> Option<IrqSource> {
        let mut regs = self.regs.borrow_mut();
        if let Some(idx) = regs.channels.iter().position(|ch| ch.interrupt && ch.flag) {
            regs.channels[idx].flag = false;
            return Some(IrqSource::Channel(idx as u8));
        }
        if regs.overflow_interrupt && regs.overflow_flag {
            regs.overflow_flag = false;
            return Some(IrqSource::Overflow);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_sets_overflow_flag() {
        let sim = SimTimer::new(3);
        sim.set_counter(0xFFFE);
        sim.tick();
        assert!(!sim.overflow_flag());
        sim.tick();
        assert_eq!(sim.counter(), 0);
        assert!(sim.overflow_flag());
        assert!(!sim.interrupt_pending());
        sim.set_overflow_interrupt(true);
        assert!(sim.interrupt_pending());
        assert_eq!(sim.take_pending(), Some(IrqSource::Overflow));
        assert!(!sim.overflow_flag());
    }

    #[test]
    fn test_compare_match_and_priority() {
        let sim = SimTimer::new(3);
        sim.set_compare(2, 5);
        sim.set_channel_interrupt(2, true);
        sim.set_overflow_interrupt(true);
        sim.set_counter(0xFFFF);
        sim.set_compare(1, 0);
        sim.set_channel_interrupt(1, true);
        sim.tick();
        assert_eq!(sim.take_pending(), Some(IrqSource::Channel(1)));
        assert_eq!(sim.take_pending(), Some(IrqSource::Overflow));
        assert_eq!(sim.take_pending(), None);
        sim.advance(5);
        assert_eq!(sim.take_pending(), Some(IrqSource::Channel(2)));
    }

    #[test]
    fn test_capture_edges_and_overrun() {
        let sim = SimTimer::new(2);
        sim.configure_capture(1, CaptureMode::Both, CaptureInput::A);
        sim.set_counter(10);
        sim.edge(1, true);
        assert_eq!(sim.compare(1), 10);
        assert!(sim.channel_flag(1));
        sim.advance(4);
        sim.edge(1, false);
        assert_eq!(sim.compare(1), 14);
        assert!(sim.capture_overrun(1));
        assert!(!sim.capture_input(1));
    }

    #[test]
    fn test_halted_counter_does_not_move() {
        let sim = SimTimer::new(1);
        sim.halt();
        sim.advance(10);
        assert_eq!(sim.counter(), 0);
        sim.resume();
        sim.advance(10);
        assert_eq!(sim.counter(), 10);
    }

    #[test]
    fn test_read_glitch_is_one_shot() {
        let sim = SimTimer::new(1);
        sim.set_counter(100);
        sim.inject_read_glitch(1);
        assert_eq!(sim.counter(), 101);
        assert_eq!(sim.counter(), 100);
    }
}
