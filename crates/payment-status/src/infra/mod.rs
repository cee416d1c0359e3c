pub mod lightning;
