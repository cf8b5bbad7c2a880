/// FlowController implements the backpressure between us and the device:
/// firmware with small receive buffers silently drops commands if it gets
/// flooded, so we only read more input while the number of unconfirmed
/// commands is within bounds.
/// A limit of 0 means strict lockstep (each command must be confirmed before
/// the next one is read). Larger limits allow pipelining, which some firmware
/// needs to keep moves smooth.
#[derive(Clone, Debug)]
pub struct FlowController {
    in_flight: usize,
    max_in_flight: usize,
}

impl FlowController {
    pub fn new(max_in_flight: usize) -> FlowController {
        FlowController {
            in_flight: 0,
            max_in_flight,
        }
    }

    /// Whether the command source may be polled for more input.
    pub fn may_poll_commands(&self) -> bool {
        self.in_flight <= self.max_in_flight
    }

    pub fn on_transmitted(&mut self) {
        self.in_flight += 1;
    }

    /// Returns false if there was nothing outstanding, i.e. the confirmation
    /// was spurious. That's not an error: firmware commonly sends an "ok" on
    /// boot or in response to noise on the line.
    pub fn on_confirmed(&mut self) -> bool {
        match self.in_flight.checked_sub(1) {
            Some(in_flight) => {
                self.in_flight = in_flight;
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
