//! Link supervisor built on top of [`CanLink`].
//!
//! It keeps the receive cadence alive and optionally offers:
//!
//! * a transmission handle (`LinkHandle`) to queue outgoing frames;
//! * a frame receiver (`LinkFrames`) to pull completed frames.
//!
//! Firmware decides which features it needs by providing pre-allocated
//! [`embassy_sync::channel::Channel`] instances. No allocation is
//! performed by the library and there is no dependency on a particular
//! BSP.

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Receiver, Sender},
};

use crate::error::LinkRunError;
use crate::protocol::frame::CanFrame;
use crate::protocol::link::CanLink;
use crate::protocol::traits::bit_timer::BitTimer;
use crate::protocol::traits::bit_wire::BitWire;

/// Receiver polls the runner schedules per bit time.
///
/// The engine requires at least one poll per bit time to avoid missing
/// bus edges; four keeps a comfortable margin without saturating the
/// executor, since off-cadence polls return immediately.
pub const RX_POLLS_PER_BIT: u32 = 4;

/// Commands queued by producer tasks.
#[derive(Clone)]
pub enum LinkCommand {
    /// Transmit one data frame.
    SendFrame(CanFrame),
}

/// Service assembling the supervisor components.
pub struct LinkService<'a, W, T, const CMD_CAP: usize, const FRAME_CAP: usize>
where
    W: BitWire,
    T: BitTimer,
{
    link: CanLink<W, T>,
    poll_timer: T,
    command_channel: Option<&'a Channel<CriticalSectionRawMutex, LinkCommand, CMD_CAP>>,
    frame_channel: Option<&'a Channel<CriticalSectionRawMutex, CanFrame, FRAME_CAP>>,
}

impl<'a, W, T, const CMD_CAP: usize, const FRAME_CAP: usize>
    LinkService<'a, W, T, CMD_CAP, FRAME_CAP>
where
    W: BitWire,
    T: BitTimer,
{
    /// Wrap an already-initialised [`CanLink`]. The `poll_timer` paces
    /// the runner loop and must tick against the same clock as the wire.
    pub fn new(
        link: CanLink<W, T>,
        poll_timer: T,
        command_channel: Option<&'a Channel<CriticalSectionRawMutex, LinkCommand, CMD_CAP>>,
        frame_channel: Option<&'a Channel<CriticalSectionRawMutex, CanFrame, FRAME_CAP>>,
    ) -> Self {
        Self {
            link,
            poll_timer,
            command_channel,
            frame_channel,
        }
    }

    /// Split into handle/receiver/runner components.
    pub fn into_parts(self) -> LinkServiceParts<'a, W, T, CMD_CAP, FRAME_CAP> {
        let handle = self.command_channel.map(|channel| LinkHandle {
            sender: channel.sender(),
        });
        let frames = self.frame_channel.map(|channel| LinkFrames {
            receiver: channel.receiver(),
        });
        LinkServiceParts {
            handle,
            frames,
            runner: LinkRunner {
                link: self.link,
                poll_timer: self.poll_timer,
                command_channel: self.command_channel,
                frame_channel: self.frame_channel,
            },
        }
    }
}

/// Bundle returned by [`LinkService::into_parts`].
pub struct LinkServiceParts<'a, W, T, const CMD_CAP: usize, const FRAME_CAP: usize>
where
    W: BitWire,
    T: BitTimer,
{
    pub handle: Option<LinkHandle<'a, CMD_CAP>>,
    pub frames: Option<LinkFrames<'a, FRAME_CAP>>,
    pub runner: LinkRunner<'a, W, T, CMD_CAP, FRAME_CAP>,
}

/// Runner that drives the supervisor loop.
pub struct LinkRunner<'a, W, T, const CMD_CAP: usize, const FRAME_CAP: usize>
where
    W: BitWire,
    T: BitTimer,
{
    link: CanLink<W, T>,
    poll_timer: T,
    command_channel: Option<&'a Channel<CriticalSectionRawMutex, LinkCommand, CMD_CAP>>,
    frame_channel: Option<&'a Channel<CriticalSectionRawMutex, CanFrame, FRAME_CAP>>,
}

impl<'a, W, T, const CMD_CAP: usize, const FRAME_CAP: usize>
    LinkRunner<'a, W, T, CMD_CAP, FRAME_CAP>
where
    W: BitWire,
    T: BitTimer,
{
    /// Drive the link until the node goes bus-off.
    ///
    /// Completed frames go to the frame channel. Recoverable send and
    /// receive failures are dropped after logging; retry stays with the
    /// producer, as the link engine never retries on its own.
    pub async fn drive(mut self) -> Result<(), LinkRunError> {
        let poll_period = (self.link.bit_time_us() / RX_POLLS_PER_BIT).max(1);

        loop {
            match self.link.poll_receive().await {
                Ok(Some(frame)) => {
                    if let Some(frame_ch) = self.frame_channel {
                        frame_ch.send(frame).await;
                    }
                }
                Ok(None) => {}
                Err(_err) => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("incoming frame dropped: {}", _err);
                }
            }

            if let Some(cmd_ch) = self.command_channel {
                if let Ok(command) = cmd_ch.try_receive() {
                    self.handle_command(command).await;
                }
            }

            if self.link.health().is_bus_off() {
                return Err(LinkRunError::BusOff);
            }

            self.poll_timer.delay_us(poll_period).await;
        }
    }

    async fn handle_command(&mut self, command: LinkCommand) {
        match command {
            LinkCommand::SendFrame(frame) => {
                if let Err(_err) = self.link.send(&frame).await {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("queued frame not sent: {}", _err);
                }
            }
        }
    }
}

/// Transmission handle (optional).
pub struct LinkHandle<'a, const CMD_CAP: usize> {
    sender: Sender<'a, CriticalSectionRawMutex, LinkCommand, CMD_CAP>,
}

impl<'a, const CMD_CAP: usize> LinkHandle<'a, CMD_CAP> {
    /// Queue one frame for transmission by the runner.
    pub async fn send_frame(&self, frame: &CanFrame) {
        self.sender.send(LinkCommand::SendFrame(*frame)).await;
    }
}

/// Optional receiver returning frames completed by the runner.
pub struct LinkFrames<'a, const FRAME_CAP: usize> {
    receiver: Receiver<'a, CriticalSectionRawMutex, CanFrame, FRAME_CAP>,
}

impl<'a, const FRAME_CAP: usize> LinkFrames<'a, FRAME_CAP> {
    /// Wait for the next completed frame.
    pub async fn recv(&mut self) -> CanFrame {
        self.receiver.receive().await
    }
}
