//! Integration tests for the node: single-node lifecycle and clusters of
//! real nodes talking over loopback mTLS.

mod helpers;
