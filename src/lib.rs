// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

pub mod action;
pub mod amqp;
pub mod channel;
pub mod config;
pub mod errors;
pub mod exchange;
pub mod queue;
pub mod specification;
pub mod topology;
