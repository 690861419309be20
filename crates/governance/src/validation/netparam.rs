//! Network parameter update checks.
//!
//! Legality is judged against the store's current values, at submission and
//! again at enactment. Two updates that are each valid alone can cross (a new
//! minimum above a new maximum); whichever is enacted first wins and the
//! other fails when its turn comes.

use crate::collaborators::NetParams;
use crate::error::{Rejection, ValidationResult};
use crate::types::change::NetworkParameter;
use crate::types::ProposalError;

pub fn validate_network_parameter_update(
    netp: &dyn NetParams,
    np: &NetworkParameter,
) -> ValidationResult {
    if np.key.is_empty() {
        return Err(Rejection::msg(
            ProposalError::NetworkParameterInvalidKey,
            "missing network parameter key",
        ));
    }
    if np.value.is_empty() {
        return Err(Rejection::msg(
            ProposalError::NetworkParameterInvalidValue,
            "missing network parameter value",
        ));
    }
    netp.validate(&np.key, &np.value).map_err(|e| {
        Rejection::msg(ProposalError::NetworkParameterValidationFailed, e.to_string())
    })
}
