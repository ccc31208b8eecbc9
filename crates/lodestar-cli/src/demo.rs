//! The demo service served by `lodestar serve`.

use lodestar_server::{ServerDispatcher, ServiceDefinition, ServiceError};

/// `Echo` with a handful of methods that exercise the type coercions.
pub fn dispatcher() -> ServerDispatcher {
    ServerDispatcher::new().with_service(
        ServiceDefinition::new("Echo")
            .method1("echo", |s: String| Ok(s))
            .method1("reverse", |s: String| Ok(s.chars().rev().collect::<String>()))
            .method2("repeat", |s: String, times: u32| {
                if times > 1000 {
                    return Err(ServiceError::invalid_argument("times must be at most 1000"));
                }
                Ok(s.repeat(times as usize))
            })
            .method1("sum", |xs: Vec<i64>| Ok(xs.iter().sum::<i64>())),
    )
}
