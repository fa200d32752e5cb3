use crate::{
    Result,
    constants::{MAX_CREDENTIAL_ID_LENGTH, MIN_CREDENTIAL_ID_LENGTH},
    error::{AuthorizationError, Error, HardwareFaultKind},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Identifier presented at the turnstile: an RFID card id or a username.
///
/// The identifier is trimmed before validation and must be printable ASCII
/// without whitespace.
///
/// # Security
/// Equality is constant-time so that registry lookups do not leak how many
/// leading characters of a guessed identifier were correct.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialId(String);

impl CredentialId {
    /// Create a new credential identifier with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCredentialId` if:
    /// - The trimmed identifier is empty or longer than 64 characters
    /// - It contains whitespace, control or non-ASCII characters
    pub fn new(raw: &str) -> Result<Self> {
        let id = raw.trim();

        let len = id.len();
        if !(MIN_CREDENTIAL_ID_LENGTH..=MAX_CREDENTIAL_ID_LENGTH).contains(&len) {
            return Err(Error::InvalidCredentialId(format!(
                "must be {MIN_CREDENTIAL_ID_LENGTH}-{MAX_CREDENTIAL_ID_LENGTH} chars, got {len}"
            )));
        }

        if !id.chars().all(|c| c.is_ascii_graphic()) {
            return Err(Error::InvalidCredentialId(format!(
                "'{id}' must be printable ASCII without spaces"
            )));
        }

        Ok(CredentialId(id.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Printable label for an identifier that failed validation.
    ///
    /// Control characters become `?` and the result is cut to the maximum
    /// identifier length, so it can go into logs and telemetry tags as is.
    #[must_use]
    pub fn label_for(raw: &str) -> String {
        raw.trim()
            .chars()
            .take(MAX_CREDENTIAL_ID_LENGTH)
            .map(|c| if c.is_control() { '?' } else { c })
            .collect()
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CredentialId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CredentialId::new(s)
    }
}

impl TryFrom<String> for CredentialId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        CredentialId::new(&value)
    }
}

impl From<CredentialId> for String {
    fn from(id: CredentialId) -> Self {
        id.0
    }
}

impl PartialEq for CredentialId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CredentialId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Role attached to a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(Error::Config(format!("Invalid role: {other}"))),
        }
    }
}

/// Physical door state.
///
/// Exactly one value exists per door at any instant. The transition table in
/// [`can_transition_to`](DoorState::can_transition_to) is the only way the
/// door controller is allowed to move between states.
///
/// # Valid Transitions
///
/// - `Closed` → `Opening` → `Open` → `Closing` → `Closed`
/// - `Open` ⇄ `Crossing`, and `Crossing` → `Closing`
/// - any state except `Fault` → `Fault`
/// - `Fault` → `Closed` (administrative clear only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DoorState {
    Closed,
    Opening,
    Open,
    Crossing,
    Closing,
    Fault,
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DoorState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use metrogate_core::DoorState;
    ///
    /// assert!(DoorState::Closed.can_transition_to(&DoorState::Opening));
    /// assert!(!DoorState::Closed.can_transition_to(&DoorState::Open));
    /// assert!(DoorState::Fault.can_transition_to(&DoorState::Closed));
    /// ```
    pub fn can_transition_to(&self, target: &DoorState) -> bool {
        matches!(
            (self, target),
            // Normal cycle
            (DoorState::Closed, DoorState::Opening)
            | (DoorState::Opening, DoorState::Open)
            | (DoorState::Open, DoorState::Crossing | DoorState::Closing)
            | (DoorState::Crossing, DoorState::Open | DoorState::Closing)
            | (DoorState::Closing, DoorState::Closed)
            // Faults
            | (
                DoorState::Closed
                | DoorState::Opening
                | DoorState::Open
                | DoorState::Crossing
                | DoorState::Closing,
                DoorState::Fault
            )
            | (DoorState::Fault, DoorState::Closed)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DoorState::Closed => "CLOSED",
            DoorState::Opening => "OPENING",
            DoorState::Open => "OPEN",
            DoorState::Crossing => "CROSSING",
            DoorState::Closing => "CLOSING",
            DoorState::Fault => "FAULT",
        }
    }

    /// Returns `true` while the door leaf is away from its closed stop.
    #[inline]
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(
            self,
            DoorState::Opening | DoorState::Open | DoorState::Crossing | DoorState::Closing
        )
    }

    /// Returns `true` while the door accepts crossings.
    #[inline]
    #[must_use]
    pub fn is_passable(self) -> bool {
        matches!(self, DoorState::Open | DoorState::Crossing)
    }

    /// Status label used by the dashboard (`ABIERTA` / `CERRADA`).
    #[must_use]
    pub fn status_label(self) -> &'static str {
        if self.is_open() { "ABIERTA" } else { "CERRADA" }
    }
}

/// Beam sensor identifier.
///
/// Sensor A sits on the unpaid side, sensor B on the paid side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorId {
    A,
    B,
}

impl SensorId {
    #[inline]
    #[must_use]
    pub fn other(self) -> SensorId {
        match self {
            SensorId::A => SensorId::B,
            SensorId::B => SensorId::A,
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SensorId::A => write!(f, "A"),
            SensorId::B => write!(f, "B"),
        }
    }
}

/// Direction of a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossingDirection {
    /// A occluded first (unpaid side to paid side).
    Inbound,
    /// B occluded first.
    Outbound,
    /// Could not be resolved (stalled in the gap).
    Ambiguous,
}

impl CrossingDirection {
    /// Direction implied by the sensor that occluded first.
    #[must_use]
    pub fn from_first_sensor(sensor: SensorId) -> Self {
        match sensor {
            SensorId::A => CrossingDirection::Inbound,
            SensorId::B => CrossingDirection::Outbound,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CrossingDirection::Inbound => "inbound",
            CrossingDirection::Outbound => "outbound",
            CrossingDirection::Ambiguous => "ambiguous",
        }
    }
}

impl fmt::Display for CrossingDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an access attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessOutcome {
    Granted,
    Denied,
}

impl AccessOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AccessOutcome::Granted => "granted",
            AccessOutcome::Denied => "denied",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, AccessOutcome::Granted)
    }
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason code recorded on a denied attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    UnknownCredential,
    CredentialDisabled,
    SessionRequired,
    Cooldown,
    /// Door is in the middle of another cycle.
    DoorBusy,
    /// Door is in `FAULT` and waits for an operator.
    HardwareFault,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::UnknownCredential => "unknown_credential",
            DenyReason::CredentialDisabled => "credential_disabled",
            DenyReason::SessionRequired => "session_required",
            DenyReason::Cooldown => "cooldown",
            DenyReason::DoorBusy => "door_busy",
            DenyReason::HardwareFault => "hardware_fault",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&AuthorizationError> for DenyReason {
    fn from(error: &AuthorizationError) -> Self {
        match error {
            AuthorizationError::UnknownCredential => DenyReason::UnknownCredential,
            AuthorizationError::CredentialDisabled => DenyReason::CredentialDisabled,
            AuthorizationError::SessionRequired => DenyReason::SessionRequired,
            AuthorizationError::Cooldown { .. } => DenyReason::Cooldown,
        }
    }
}

impl From<HardwareFaultKind> for DenyReason {
    fn from(_: HardwareFaultKind) -> Self {
        DenyReason::HardwareFault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("card-42", "card-42")]
    #[case("  usuario1 ", "usuario1")]
    #[case("04ABCDEF12", "04ABCDEF12")]
    fn test_credential_id_valid(#[case] input: &str, #[case] expected: &str) {
        let id = CredentialId::new(input).unwrap();
        assert_eq!(id.as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("juan perez")]
    #[case("tarjeta\u{e9}")]
    fn test_credential_id_invalid(#[case] input: &str) {
        assert!(CredentialId::new(input).is_err());
    }

    #[test]
    fn test_credential_id_too_long() {
        let raw = "x".repeat(MAX_CREDENTIAL_ID_LENGTH + 1);
        assert!(CredentialId::new(&raw).is_err());
    }

    #[test]
    fn test_label_for_unvalidated_input() {
        assert_eq!(CredentialId::label_for("  card\n999\r\tx "), "card?999??x");
        let long = "y".repeat(MAX_CREDENTIAL_ID_LENGTH * 4);
        assert_eq!(CredentialId::label_for(&long).len(), MAX_CREDENTIAL_ID_LENGTH);
    }

    #[test]
    fn test_credential_id_serde_validates() {
        let id: CredentialId = serde_json::from_str("\"card-42\"").unwrap();
        assert_eq!(id.as_str(), "card-42");
        assert!(serde_json::from_str::<CredentialId>("\"\"").is_err());
    }

    #[rstest]
    #[case("admin", Role::Admin)]
    #[case("USER", Role::User)]
    fn test_role_parse(#[case] input: &str, #[case] expected: Role) {
        assert_eq!(input.parse::<Role>().unwrap(), expected);
    }

    #[test]
    fn test_role_parse_invalid() {
        assert!("operator".parse::<Role>().is_err());
    }

    #[rstest]
    #[case(DoorState::Closed, DoorState::Opening)]
    #[case(DoorState::Opening, DoorState::Open)]
    #[case(DoorState::Open, DoorState::Crossing)]
    #[case(DoorState::Crossing, DoorState::Open)]
    #[case(DoorState::Crossing, DoorState::Closing)]
    #[case(DoorState::Open, DoorState::Closing)]
    #[case(DoorState::Closing, DoorState::Closed)]
    #[case(DoorState::Opening, DoorState::Fault)]
    #[case(DoorState::Fault, DoorState::Closed)]
    fn test_door_valid_transitions(#[case] from: DoorState, #[case] to: DoorState) {
        assert!(from.can_transition_to(&to));
    }

    #[rstest]
    #[case(DoorState::Closed, DoorState::Open)]
    #[case(DoorState::Opening, DoorState::Closing)]
    #[case(DoorState::Closing, DoorState::Opening)]
    #[case(DoorState::Fault, DoorState::Opening)]
    #[case(DoorState::Fault, DoorState::Fault)]
    #[case(DoorState::Closed, DoorState::Closed)]
    fn test_door_invalid_transitions(#[case] from: DoorState, #[case] to: DoorState) {
        assert!(!from.can_transition_to(&to));
    }

    #[test]
    fn test_door_status_label() {
        assert_eq!(DoorState::Closed.status_label(), "CERRADA");
        assert_eq!(DoorState::Fault.status_label(), "CERRADA");
        assert_eq!(DoorState::Open.status_label(), "ABIERTA");
        assert_eq!(DoorState::Closing.status_label(), "ABIERTA");
    }

    #[test]
    fn test_direction_from_first_sensor() {
        assert_eq!(
            CrossingDirection::from_first_sensor(SensorId::A),
            CrossingDirection::Inbound
        );
        assert_eq!(
            CrossingDirection::from_first_sensor(SensorId::B),
            CrossingDirection::Outbound
        );
        assert_eq!(SensorId::A.other(), SensorId::B);
    }

    #[test]
    fn test_deny_reason_from_authorization_error() {
        let reason = DenyReason::from(&AuthorizationError::Cooldown { remaining_ms: 10 });
        assert_eq!(reason, DenyReason::Cooldown);
        assert_eq!(reason.as_str(), "cooldown");
        assert_eq!(
            DenyReason::from(HardwareFaultKind::SensorDropout),
            DenyReason::HardwareFault
        );
    }
}
