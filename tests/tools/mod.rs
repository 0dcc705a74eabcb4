//! Tool surface tests.

mod dispatch_test;
