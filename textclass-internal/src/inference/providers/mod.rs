pub mod candle;
pub mod dummy;
