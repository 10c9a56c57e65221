use core::fmt::Debug;

use xtensa_lx106::{ExceptionCause, RawTrapFrame};

/// Core and SoC control the session needs while the program is stopped.
pub trait Target {
    fn mask_interrupts(&mut self);
    fn unmask_interrupts(&mut self);

    fn disable_watchdog(&mut self);
    fn enable_watchdog(&mut self);
    /// Called between polls of the connection while waiting for the debugger.
    fn feed_watchdog(&mut self);

    /// Programs ICOUNT so the core traps again after one instruction.
    fn arm_single_step(&mut self);

    /// Raises a debug exception in the calling code, `break 0,0` on the lx106.
    /// Returns once the debugger lets the program continue.
    fn request_break();
}

/// Receives frames from the debug vector and the exception vector.
///
/// Both return the frame the vector restores before returning to the program.
pub trait TrapHandler {
    fn on_debug_trap(&mut self, frame: RawTrapFrame) -> RawTrapFrame;
    fn on_exception(&mut self, frame: RawTrapFrame) -> RawTrapFrame;
}

/// Hooks a [`TrapHandler`] into the vectors of the running firmware.
pub trait TrapRegistry {
    type Error: Debug;

    /// Routes the debug vector and every cause in `causes` to `handler`.
    fn register_handler(
        &mut self,
        causes: &[ExceptionCause],
        handler: &'static mut dyn TrapHandler,
    ) -> Result<(), Self::Error>;
}
