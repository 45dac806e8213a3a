//! Engine-level tests against counting mock services.

mod support;
