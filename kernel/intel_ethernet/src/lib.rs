//! Descriptor types used by Intel ethernet cards.
//!
//! Only the legacy 16-byte descriptor format is defined here, since that is
//! what the e1000 family uses. The `TxDescriptor`/`RxDescriptor` traits
//! capture the hardware/software ownership handoff so that the queue layer
//! can stay generic over the concrete descriptor layout.

#![cfg_attr(not(test), no_std)]

pub mod descriptors;
