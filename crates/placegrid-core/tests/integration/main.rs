mod common;
mod extraction_run_tests;
