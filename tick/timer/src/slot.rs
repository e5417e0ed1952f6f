//! Per-channel bookkeeping.
//!
//! Every capture/compare channel owns one slot in the timer's arena. The
//! slot kind decides which handler services the channel interrupt.

use crate::alarm::{AlarmCallback, AlarmState};
use crate::mux::MuxQueue;
use crate::pulse::CaptureSlot;

pub(crate) enum ChannelSlot<const M: usize> {
    Free,
    /// Latch channel, or channel 0 without an interrupt handler.
    Reserved,
    Alarm(AlarmSlot<M>),
    Capture(CaptureSlot),
}

pub(crate) struct AlarmSlot<const M: usize> {
    pub(crate) state: AlarmState,
    pub(crate) deadline: u32,
    /// Deadline lies in a later overflow epoch; the overflow handler arms it.
    pub(crate) awaiting_epoch: bool,
    pub(crate) kind: AlarmKind<M>,
}

impl<const M: usize> AlarmSlot<M> {
    pub(crate) fn new(kind: AlarmKind<M>) -> Self {
        Self {
            state: AlarmState::Disabled,
            deadline: 0,
            awaiting_epoch: false,
            kind,
        }
    }
}

pub(crate) enum AlarmKind<const M: usize> {
    Callback(AlarmCallback),
    Multiplexed(MuxQueue<M>),
}
