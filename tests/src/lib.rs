//! Cross-crate scenarios for the discovery engine, driven without touching the network.

#[cfg(test)]
mod discovery;
