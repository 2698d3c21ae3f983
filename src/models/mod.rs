pub mod match_state;
pub mod player;
pub mod queue;
pub mod rejection;
pub mod round;
pub mod upcoming;

pub use match_state::*;
pub use player::*;
pub use queue::*;
pub use rejection::*;
pub use round::*;
pub use upcoming::*;
