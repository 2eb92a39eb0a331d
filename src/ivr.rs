use crate::call_store::CallStatus;
use crate::consts::GATHER_TIMEOUT_SECS;
use crate::twilio_types::{
    GatherAction, GatherChild, PauseAction, Response, ResponseAction, SayAction,
};

use serde::{Deserialize, Serialize};

pub const SESSION_VERSION: u8 = 1;

const PROMPT_INSTRUCTIONS: &str =
    "Press 1 to accept this order. Press 2 to reject it. Press 3 to repeat this message.";
const NO_INPUT_TEXT: &str = "Goodbye.";
const ACCEPTED_TEXT: &str = "Thank you. The order has been accepted. Goodbye.";
const REJECTED_TEXT: &str = "Understood. The order has been rejected. Goodbye.";
const APOLOGY_TEXT: &str = "An error occurred. No message provided.";

/// Correlation state smuggled through every provider callback URL.  The
/// provider retains no application state between webhook turns, so the whole
/// session travels as a urlencoded query string and is parsed back on each
/// turn; free-text order details survive reserved URL characters that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    pub v: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    pub message: String,
}

impl CallSession {
    pub fn new(message: String, delivery_id: Option<String>) -> Self {
        Self {
            v: SESSION_VERSION,
            call_sid: None,
            delivery_id,
            message,
        }
    }

    pub fn to_query(&self) -> String {
        serde_urlencoded::to_string(self).unwrap()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvrState {
    AwaitingInput,
    Accepted,
    Rejected,
    Ended,
}

impl IvrState {
    pub fn from_status(status: CallStatus) -> Self {
        match status {
            CallStatus::Initiated => IvrState::AwaitingInput,
            CallStatus::Accepted => IvrState::Accepted,
            CallStatus::Rejected => IvrState::Rejected,
            CallStatus::Completed | CallStatus::Failed => IvrState::Ended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvrInput {
    Digit(char),
    Timeout,
}

impl IvrInput {
    pub fn from_digits(digits: Option<&str>) -> Self {
        digits
            .and_then(|d| d.chars().next())
            .map(IvrInput::Digit)
            .unwrap_or(IvrInput::Timeout)
    }
}

/// What the callee hears next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Prompt,
    Accepted,
    Rejected,
    Goodbye,
}

pub struct Transition {
    pub next: IvrState,
    /// Status to record against the call, when the input settles it.
    pub record: Option<CallStatus>,
    pub reply: Reply,
}

/// The whole call flow as one literal table: state x input -> next state,
/// store effect, reply.  Terminal states absorb every input with no effect,
/// which is what makes provider retries idempotent.
pub fn transition(state: IvrState, input: IvrInput) -> Transition {
    match (state, input) {
        (IvrState::AwaitingInput, IvrInput::Digit('1')) => Transition {
            next: IvrState::Accepted,
            record: Some(CallStatus::Accepted),
            reply: Reply::Accepted,
        },
        (IvrState::AwaitingInput, IvrInput::Digit('2')) => Transition {
            next: IvrState::Rejected,
            record: Some(CallStatus::Rejected),
            reply: Reply::Rejected,
        },
        (IvrState::AwaitingInput, IvrInput::Digit('3')) => Transition {
            next: IvrState::AwaitingInput,
            record: None,
            reply: Reply::Prompt,
        },
        (IvrState::AwaitingInput, _) => Transition {
            next: IvrState::Ended,
            record: None,
            reply: Reply::Goodbye,
        },
        (IvrState::Accepted, _) => Transition {
            next: IvrState::Accepted,
            record: None,
            reply: Reply::Accepted,
        },
        (IvrState::Rejected, _) => Transition {
            next: IvrState::Rejected,
            record: None,
            reply: Reply::Rejected,
        },
        (IvrState::Ended, _) => Transition {
            next: IvrState::Ended,
            record: None,
            reply: Reply::Goodbye,
        },
    }
}

fn say(text: &str) -> SayAction {
    SayAction {
        text: text.to_string(),
        ..Default::default()
    }
}

fn say_script(text: &str) -> Response {
    Response {
        actions: vec![ResponseAction::Say(say(text))],
    }
}

/// The initial order prompt: read the order, then gather one keypress and
/// post it back with the full session in the action URL.
pub fn prompt_script(session: &CallSession, public_base_url: &str) -> Response {
    let action = format!(
        "{}/twilio/order-response?{}",
        public_base_url,
        session.to_query()
    );
    Response {
        actions: vec![
            ResponseAction::Gather(GatherAction {
                action,
                method: Some("POST".to_string()),
                num_digits: Some(1),
                timeout: Some(GATHER_TIMEOUT_SECS),
                prompts: vec![
                    GatherChild::Say(say(&session.message)),
                    GatherChild::Pause(PauseAction { length: Some(1) }),
                    GatherChild::Say(say(PROMPT_INSTRUCTIONS)),
                ],
            }),
            ResponseAction::Say(say(NO_INPUT_TEXT)),
        ],
    }
}

/// Terminal script for webhook turns that cannot be interpreted.  Webhook
/// responses must always be valid script documents, never HTTP errors.
pub fn apology_script() -> Response {
    say_script(APOLOGY_TEXT)
}

pub fn reply_script(reply: Reply, session: &CallSession, public_base_url: &str) -> Response {
    match reply {
        Reply::Prompt => prompt_script(session, public_base_url),
        Reply::Accepted => say_script(ACCEPTED_TEXT),
        Reply::Rejected => say_script(REJECTED_TEXT),
        Reply::Goodbye => say_script(NO_INPUT_TEXT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CallSession {
        CallSession {
            v: SESSION_VERSION,
            call_sid: Some("CA123".to_string()),
            delivery_id: Some("d-1".to_string()),
            message: "New order: 2 burritos & chips".to_string(),
        }
    }

    #[test]
    fn digit_one_accepts_and_records() {
        let t = transition(IvrState::AwaitingInput, IvrInput::Digit('1'));
        assert_eq!(t.next, IvrState::Accepted);
        assert_eq!(t.record, Some(CallStatus::Accepted));
        assert_eq!(t.reply, Reply::Accepted);
    }

    #[test]
    fn digit_two_rejects_and_records() {
        let t = transition(IvrState::AwaitingInput, IvrInput::Digit('2'));
        assert_eq!(t.next, IvrState::Rejected);
        assert_eq!(t.record, Some(CallStatus::Rejected));
        assert_eq!(t.reply, Reply::Rejected);
    }

    #[test]
    fn digit_three_repeats_without_recording() {
        let t = transition(IvrState::AwaitingInput, IvrInput::Digit('3'));
        assert_eq!(t.next, IvrState::AwaitingInput);
        assert_eq!(t.record, None);
        assert_eq!(t.reply, Reply::Prompt);
    }

    #[test]
    fn unrecognized_digit_and_timeout_end_silently() {
        for input in [IvrInput::Digit('9'), IvrInput::Digit('*'), IvrInput::Timeout] {
            let t = transition(IvrState::AwaitingInput, input);
            assert_eq!(t.next, IvrState::Ended);
            assert_eq!(t.record, None);
            assert_eq!(t.reply, Reply::Goodbye);
        }
    }

    #[test]
    fn terminal_states_absorb_all_input() {
        for state in [IvrState::Accepted, IvrState::Rejected, IvrState::Ended] {
            for input in [IvrInput::Digit('1'), IvrInput::Digit('2'), IvrInput::Timeout] {
                let t = transition(state, input);
                assert_eq!(t.next, state);
                assert_eq!(t.record, None);
            }
        }
    }

    #[test]
    fn repeat_reply_is_identical_to_initial_prompt() {
        let s = session();
        let t = transition(IvrState::AwaitingInput, IvrInput::Digit('3'));
        let replay = reply_script(t.reply, &s, "https://relay.test");
        assert_eq!(replay, prompt_script(&s, "https://relay.test"));
    }

    #[test]
    fn session_round_trips_through_query_string() {
        let s = session();
        let query = s.to_query();
        let parsed: CallSession = serde_urlencoded::from_str(&query).unwrap();
        assert_eq!(parsed, s);
    }

    #[test]
    fn session_query_escapes_reserved_characters() {
        let s = CallSession::new("1 burrito & 2 tacos? yes=please".to_string(), None);
        let query = s.to_query();
        assert!(!query.contains("& "));
        let parsed: CallSession = serde_urlencoded::from_str(&query).unwrap();
        assert_eq!(parsed.message, s.message);
    }

    #[test]
    fn prompt_script_carries_session_in_action_url() {
        let s = session();
        let script = prompt_script(&s, "https://relay.test");
        match &script.actions[0] {
            ResponseAction::Gather(gather) => {
                assert!(gather
                    .action
                    .starts_with("https://relay.test/twilio/order-response?"));
                assert!(gather.action.contains("call_sid=CA123"));
                assert!(gather.action.contains("delivery_id=d-1"));
                assert_eq!(gather.num_digits, Some(1));
            }
            other => panic!("expected a gather, got {other:?}"),
        }
    }
}
