#![no_std]

// Lets the loader name this crate as a build dependency so cargo rebuilds the
// probes when they change. The programs themselves live in the binary target.
