//! Integration tests for the event loop and the shutdown protocol.

mod event_loop_test;
mod shutdown_test;
