//! Internal events: one struct per thing worth logging or counting, emitted through [`emit!`].

mod kubernetes;
mod process;
mod reconcile;

pub use self::kubernetes::*;
pub use self::process::*;
pub use self::reconcile::*;

pub trait InternalEvent: Sized {
    fn emit(self);
}

pub fn emit(event: impl InternalEvent) {
    event.emit();
}

#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::internal_events::emit($event)
    };
}
