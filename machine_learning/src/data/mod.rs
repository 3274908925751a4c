mod batch;
mod frame;
mod scaler;
mod stream;

pub use batch::Batch;
pub use frame::{Features, SeriesFrame, Split, SplitBorders};
pub use scaler::StandardScaler;
pub use stream::{BatchList, BatchStream, WindowDataset, WindowSpec, WindowStream};
