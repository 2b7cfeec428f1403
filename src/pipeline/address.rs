use crate::constants::NOT_INFORMED;
use crate::table::Value;

/// Street and neighborhood tokens recovered from a listing address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParts {
    pub street: String,
    pub neighborhood: String,
}

impl AddressParts {
    fn not_informed() -> Self {
        Self {
            street: NOT_INFORMED.to_string(),
            neighborhood: NOT_INFORMED.to_string(),
        }
    }
}

/// Split `"Street, Neighborhood - City"` into street and neighborhood.
///
/// The trailing `" - City/State"` segment is cut first. The last comma then
/// separates street from neighborhood; without a comma the whole remainder is
/// taken as the neighborhood. Never fails.
pub fn decompose(address: Option<&str>) -> AddressParts {
    let Some(text) = address else {
        return AddressParts::not_informed();
    };

    let head = match text.split_once(" - ") {
        Some((left, _)) => left,
        None => text,
    };

    match head.rsplit_once(',') {
        Some((street, neighborhood)) => AddressParts {
            street: street.trim().to_string(),
            neighborhood: neighborhood.trim().to_string(),
        },
        None => AddressParts {
            street: NOT_INFORMED.to_string(),
            neighborhood: head.to_string(),
        },
    }
}

/// Decompose a table cell; only text cells carry an address
pub fn decompose_cell(cell: &Value) -> AddressParts {
    decompose(cell.as_text())
}
