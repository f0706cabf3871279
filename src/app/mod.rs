mod guard;
mod logic;
mod signals;
mod startup;


pub use guard::{Guard, GuardBuilder, DEFAULT_EVENT_CAPACITY};
pub use logic::{Decision, DecisionLogic, HardwareLogic, SoftwareLogic};
pub use signals::{install_signal_handlers, ControlFlags};
pub use startup::{
    build_guard, resolve_devices, resolve_interface, startup_policy, wait_for_protect_attributes,
};
