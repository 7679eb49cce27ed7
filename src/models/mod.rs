pub mod attribution;
pub mod company;
pub mod config;
pub mod phone_number;
pub mod pool;
pub mod contact;
pub mod call;
pub mod blocked;
pub mod recording;
pub mod ivr;

pub use attribution::*;
pub use company::*;
pub use config::*;
pub use phone_number::*;
pub use pool::*;
pub use contact::*;
pub use call::*;
pub use blocked::*;
pub use recording::*;
pub use ivr::*;
