pub mod frame;
pub mod function;
pub mod raw;
pub mod value;

pub use frame::{CapacityError, Frame, MAX_PARAMETERS, MarshaledFrame};
pub use function::NativeFunction;
pub use value::{DataType, TypeError, Value, Variable};
