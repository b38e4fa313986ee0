mod filter_tests;
mod helpers;
mod write_read_tests;
