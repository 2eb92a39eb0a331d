pub fn wrap_twiml(twiml: String) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{twiml}")
}

mod twiml {
    use xmlserde_derives::XmlSerialize;

    #[derive(Debug, PartialEq, Eq, XmlSerialize)]
    #[xmlserde(root = b"Response")]
    pub struct Response {
        #[xmlserde(ty = "untag")]
        pub actions: Vec<ResponseAction>,
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize)]
    pub enum ResponseAction {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
        #[xmlserde(name = b"Gather")]
        Gather(GatherAction),
        #[xmlserde(name = b"Pause")]
        Pause(PauseAction),
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
    pub struct SayAction {
        #[xmlserde(ty = "text")]
        pub text: String,
        #[xmlserde(name = b"voice", ty = "attr")]
        pub voice: Option<String>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
    pub struct PauseAction {
        #[xmlserde(name = b"length", ty = "attr")]
        pub length: Option<u16>,
    }

    /// Collect exactly one keypress, then POST it to `action`.  When the
    /// timeout lapses with no input, the provider falls through to the verbs
    /// after the gather.
    #[derive(Debug, PartialEq, Eq, XmlSerialize)]
    pub struct GatherAction {
        #[xmlserde(name = b"action", ty = "attr")]
        pub action: String,
        #[xmlserde(name = b"method", ty = "attr")]
        pub method: Option<String>,
        #[xmlserde(name = b"numDigits", ty = "attr")]
        pub num_digits: Option<u8>,
        #[xmlserde(name = b"timeout", ty = "attr")]
        pub timeout: Option<u16>,
        #[xmlserde(ty = "untag")]
        pub prompts: Vec<GatherChild>,
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize)]
    pub enum GatherChild {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
        #[xmlserde(name = b"Pause")]
        Pause(PauseAction),
    }
}
pub use twiml::*;

mod rest {
    use serde::Deserialize;

    /// Subset of the provider's call resource the relay reads.  Duration and
    /// timestamps come back as strings and are passed through untouched.
    #[derive(Deserialize, Debug)]
    pub struct ProviderCall {
        pub sid: String,
        pub status: Option<String>,
        pub duration: Option<String>,
        pub start_time: Option<String>,
        pub end_time: Option<String>,
        pub to: Option<String>,
        pub from: Option<String>,
    }
}
pub use rest::*;

mod webhook {
    use serde::Deserialize;

    /// Form fields the provider posts on each webhook turn.  Everything is
    /// optional: a webhook response must always be a script document, so a
    /// malformed body degrades instead of erroring.
    #[derive(Deserialize, Debug, Default)]
    pub struct VoiceWebhookForm {
        #[serde(rename = "CallSid")]
        pub call_sid: Option<String>,
        #[serde(rename = "CallStatus")]
        pub call_status: Option<String>,
        #[serde(rename = "Digits")]
        pub digits: Option<String>,
    }
}
pub use webhook::*;
