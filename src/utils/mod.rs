pub mod position_stream;
