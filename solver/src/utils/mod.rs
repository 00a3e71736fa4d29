//! Global parameters initialized from environment variables.
//!
//! An [EnvParam] exposes an internal tuning knob that is not worth a place in
//! the configuration surface but may still be toggled from the shell, e.g.
//! `ARBO_LOG_DECISIONS=true`. The parameter is read once, on first access;
//! later changes to the environment are ignored.

use std::str::FromStr;
use std::sync::OnceLock;

pub struct EnvParam<T> {
    value: OnceLock<T>,
    env: &'static str,
    default: &'static str,
}

impl<T> EnvParam<T> {
    /// Creates a parameter initialized from the environment variable `env`,
    /// or from `default` if the variable is not set.
    pub const fn new(env: &'static str, default: &'static str) -> EnvParam<T> {
        EnvParam {
            value: OnceLock::new(),
            env,
            default,
        }
    }
}

impl<T: FromStr> EnvParam<T> {
    fn read_default(&self) -> T {
        match T::from_str(self.default) {
            Ok(v) => v,
            Err(_) => panic!("{}: unparsable default value \"{}\"", self.env, self.default),
        }
    }

    fn value(&self) -> &T {
        self.value.get_or_init(|| match std::env::var(self.env) {
            Ok(text) => match T::from_str(&text) {
                Ok(v) => v,
                Err(_) => {
                    eprintln!(
                        "[env_param] {}: could not parse \"{text}\", using the default \"{}\"",
                        self.env, self.default
                    );
                    self.read_default()
                }
            },
            Err(_) => self.read_default(),
        })
    }

    pub fn get(&self) -> T
    where
        T: Copy,
    {
        *self.value()
    }

    /// Forces the value of a parameter that was not accessed yet.
    /// Panics if the parameter is already initialized.
    pub fn set(&self, value: T) {
        if self.value.set(value).is_err() {
            panic!("{}: already initialized", self.env);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_value_when_env_unset() {
        static PARAM: EnvParam<u32> = EnvParam::new("ARBO_TEST_PARAM_UNSET", "42");
        assert_eq!(PARAM.get(), 42);
    }

    #[test]
    fn test_set_before_first_read() {
        static PARAM: EnvParam<bool> = EnvParam::new("ARBO_TEST_PARAM_SET", "false");
        PARAM.set(true);
        assert_eq!(PARAM.get(), true);
    }
}
