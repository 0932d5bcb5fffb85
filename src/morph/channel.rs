//! Facial action-unit vocabulary.
//!
//! Keys follow the ARKit / Ready Player Me blend shape naming, which is what
//! most avatar exporters emit.

use std::fmt;
use std::str::FromStr;

macro_rules! channels {
    ($($(#[$doc:meta])* $variant:ident => $key:literal,)*) => {
        /// One named blend-shape slot. Stateless: channels never own values.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Channel {
            $($(#[$doc])* $variant,)*
        }

        impl Channel {
            /// Every channel in vocabulary order.
            pub const ALL: &'static [Channel] = &[$(Channel::$variant,)*];

            /// The blend shape key this channel binds to.
            pub fn key(self) -> &'static str {
                match self {
                    $(Channel::$variant => $key,)*
                }
            }
        }

        impl FromStr for Channel {
            type Err = UnknownChannel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($key => Ok(Channel::$variant),)*
                    other => Err(UnknownChannel(other.to_owned())),
                }
            }
        }
    };
}

channels! {
    // Eyes
    EyeBlinkLeft => "eyeBlinkLeft",
    EyeBlinkRight => "eyeBlinkRight",
    EyeWideLeft => "eyeWideLeft",
    EyeWideRight => "eyeWideRight",
    EyeSquintLeft => "eyeSquintLeft",
    EyeSquintRight => "eyeSquintRight",
    EyeLookUpLeft => "eyeLookUpLeft",
    EyeLookUpRight => "eyeLookUpRight",
    EyeLookDownLeft => "eyeLookDownLeft",
    EyeLookDownRight => "eyeLookDownRight",
    EyeLookInLeft => "eyeLookInLeft",
    EyeLookInRight => "eyeLookInRight",
    EyeLookOutLeft => "eyeLookOutLeft",
    EyeLookOutRight => "eyeLookOutRight",

    // Mouth
    MouthOpen => "mouthOpen",
    MouthSmile => "mouthSmile",
    MouthFrown => "mouthFrown",
    MouthPucker => "mouthPucker",
    MouthFunnel => "mouthFunnel",
    MouthLeft => "mouthLeft",
    MouthRight => "mouthRight",
    MouthRollUpper => "mouthRollUpper",
    MouthRollLower => "mouthRollLower",
    MouthShrugUpper => "mouthShrugUpper",
    MouthShrugLower => "mouthShrugLower",
    MouthClose => "mouthClose",
    MouthDimpleLeft => "mouthDimpleLeft",
    MouthDimpleRight => "mouthDimpleRight",

    // Brows
    BrowInnerUp => "browInnerUp",
    BrowOuterUpLeft => "browOuterUpLeft",
    BrowOuterUpRight => "browOuterUpRight",
    BrowDownLeft => "browDownLeft",
    BrowDownRight => "browDownRight",

    // Cheeks
    CheekPuff => "cheekPuff",
    CheekSquintLeft => "cheekSquintLeft",
    CheekSquintRight => "cheekSquintRight",

    // Jaw
    JawOpen => "jawOpen",
    JawForward => "jawForward",
    JawLeft => "jawLeft",
    JawRight => "jawRight",

    // Nose
    NoseSneerLeft => "noseSneerLeft",
    NoseSneerRight => "noseSneerRight",
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A key outside the built-in vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown expression channel: {0}")]
pub struct UnknownChannel(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn vocabulary_has_unique_keys() {
        let keys: HashSet<&str> = Channel::ALL.iter().map(|c| c.key()).collect();
        assert_eq!(keys.len(), Channel::ALL.len());
        assert_eq!(Channel::ALL.len(), 42);
    }

    #[test]
    fn every_key_parses_back() {
        for channel in Channel::ALL {
            assert_eq!(channel.key().parse::<Channel>(), Ok(*channel));
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = "tongueOut".parse::<Channel>().unwrap_err();
        assert_eq!(err, UnknownChannel("tongueOut".to_owned()));
    }

    #[test]
    fn display_uses_key() {
        assert_eq!(Channel::JawOpen.to_string(), "jawOpen");
    }
}
