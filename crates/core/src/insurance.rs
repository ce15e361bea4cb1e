//! BHYT (Bảo hiểm Y tế — national health insurance) card registry and
//! validation.
//!
//! Validation never fails the caller: every outcome, including a malformed
//! or unknown card, is an ordinary response with `is_valid` and a
//! Vietnamese-language message. Coverage is derived from the hospital-tier
//! by card-tier matrix; this deployment treats the hospital as "Hạng I".

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use hms_id::DocId;

use crate::db::Database;
use crate::domain::InsuranceCard;
use crate::error::{HmsError, HmsResult};

/// The tier of the hospital running this service.
pub const HOSPITAL_LEVEL: &str = "Hạng I";

/// Card input; the identifier is assigned on insert.
#[derive(Debug, Clone, serde::Deserialize, utoipa::ToSchema)]
pub struct NewInsuranceCard {
    pub card_number: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub issued_place: String,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub coverage_percentage: u8,
    pub hospital_level: String,
}

/// Outcome of a card validation. Never an error; `is_valid` plus `message`
/// carry the verdict.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct InsuranceValidation {
    pub is_valid: bool,
    pub message: String,
    pub card_info: Option<InsuranceCard>,
    pub coverage_percentage: Option<u8>,
    pub hospital_level: Option<String>,
}

impl InsuranceValidation {
    fn rejected(message: &str) -> Self {
        Self {
            is_valid: false,
            message: message.to_string(),
            card_info: None,
            coverage_percentage: None,
            hospital_level: None,
        }
    }
}

/// Returns true for the canonical BHYT card number shape: exactly 2 ASCII
/// uppercase letters followed by 13 digits.
pub fn is_well_formed_card_number(card_number: &str) -> bool {
    let bytes = card_number.as_bytes();
    bytes.len() == 15
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..].iter().all(u8::is_ascii_digit)
}

/// Coverage owed at a hospital of `hospital_level` to a card of
/// `card_level`. Unknown tier pairs fall back to 60%.
pub fn calculate_coverage(hospital_level: &str, card_level: &str) -> u8 {
    match (hospital_level, card_level) {
        ("Hạng I", "Hạng I") => 100,
        ("Hạng I", "Hạng II") => 80,
        ("Hạng I", "Hạng III") => 60,
        ("Hạng II", "Hạng I") => 100,
        ("Hạng II", "Hạng II") => 100,
        ("Hạng II", "Hạng III") => 80,
        ("Hạng III", _) => 100,
        _ => 60,
    }
}

/// Card registry and validation operations.
#[derive(Clone)]
pub struct InsuranceService {
    db: Arc<Database>,
}

impl InsuranceService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Validates a card number against the registry.
    ///
    /// The checks run in order: format, existence, date-of-birth match,
    /// expiry. The first failure produces the response; a pass yields the
    /// card, its coverage under this hospital's tier, and the hospital tier
    /// itself.
    ///
    /// # Errors
    ///
    /// Only `Storage` on registry access failure; a bad card is a normal
    /// response, not an error.
    pub fn validate(
        &self,
        card_number: &str,
        date_of_birth: NaiveDate,
    ) -> HmsResult<InsuranceValidation> {
        if !is_well_formed_card_number(card_number) {
            return Ok(InsuranceValidation::rejected(
                "Số thẻ BHYT không đúng định dạng (phải có 15 ký tự: 2 chữ cái + 13 số)",
            ));
        }

        let card = match self
            .db
            .cards
            .find_one(|c| c.card_number == card_number)?
        {
            Some(card) => card,
            None => {
                return Ok(InsuranceValidation::rejected(
                    "Thẻ BHYT không tồn tại trong hệ thống",
                ))
            }
        };

        if card.date_of_birth != date_of_birth {
            return Ok(InsuranceValidation::rejected(
                "Ngày sinh không khớp với thẻ BHYT",
            ));
        }

        if card.valid_to < Utc::now().date_naive() {
            return Ok(InsuranceValidation::rejected("Thẻ BHYT đã hết hạn"));
        }

        let coverage = calculate_coverage(HOSPITAL_LEVEL, &card.hospital_level);
        Ok(InsuranceValidation {
            is_valid: true,
            message: "Thẻ BHYT hợp lệ".to_string(),
            card_info: Some(card),
            coverage_percentage: Some(coverage),
            hospital_level: Some(HOSPITAL_LEVEL.to_string()),
        })
    }

    /// Registers a card.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` for a malformed card number.
    /// * `Conflict` if the card number is already registered.
    pub fn add_card(&self, input: NewInsuranceCard) -> HmsResult<InsuranceCard> {
        if !is_well_formed_card_number(&input.card_number) {
            return Err(HmsError::InvalidArgument(format!(
                "malformed card number '{}'",
                input.card_number
            )));
        }
        let card = InsuranceCard {
            id: DocId::new(),
            card_number: input.card_number,
            full_name: input.full_name,
            date_of_birth: input.date_of_birth,
            address: input.address,
            issued_place: input.issued_place,
            valid_from: input.valid_from,
            valid_to: input.valid_to,
            coverage_percentage: input.coverage_percentage,
            hospital_level: input.hospital_level,
        };
        self.db.cards.insert(card.clone())?;
        tracing::info!(card_number = %card.card_number, "insurance card registered");
        Ok(card)
    }

    /// # Errors
    ///
    /// `NotFound` if no card carries that number.
    pub fn get_card(&self, card_number: &str) -> HmsResult<InsuranceCard> {
        self.db
            .cards
            .find_one(|c| c.card_number == card_number)?
            .ok_or_else(|| HmsError::NotFound("insurance card not found".into()))
    }

    pub fn list_cards(&self) -> HmsResult<Vec<InsuranceCard>> {
        let mut cards = self.db.cards.find(|_| true)?;
        cards.sort_by(|a, b| a.card_number.cmp(&b.card_number));
        Ok(cards)
    }

    /// Seeds the registry with the stock sample cards if it is empty.
    /// Returns the number of cards inserted (0 when already populated).
    pub fn seed_sample_cards(&self) -> HmsResult<usize> {
        if !self.db.cards.is_empty()? {
            return Ok(0);
        }
        let cards = sample_cards();
        let count = cards.len();
        for card in cards {
            self.add_card(card)?;
        }
        tracing::info!(count, "seeded sample insurance cards");
        Ok(count)
    }
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    // The seed data only carries valid calendar dates.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// The stock card set, including one deliberately expired card.
fn sample_cards() -> Vec<NewInsuranceCard> {
    vec![
        NewInsuranceCard {
            card_number: "HS4010123456789".into(),
            full_name: "Nguyễn Văn A".into(),
            date_of_birth: date(1990, 1, 15),
            address: "123 Nguyễn Huệ, Q1, TP.HCM".into(),
            issued_place: "BHXH TP. Hồ Chí Minh".into(),
            valid_from: date(2024, 1, 1),
            valid_to: date(2025, 12, 31),
            coverage_percentage: 80,
            hospital_level: "Hạng I".into(),
        },
        NewInsuranceCard {
            card_number: "HS4020987654321".into(),
            full_name: "Khôi Nguyễn Đắc".into(),
            date_of_birth: date(1985, 5, 20),
            address: "456 Lê Lợi, Q1, TP.HCM".into(),
            issued_place: "BHXH TP. Hồ Chí Minh".into(),
            valid_from: date(2024, 1, 1),
            valid_to: date(2026, 12, 31),
            coverage_percentage: 100,
            hospital_level: "Hạng I".into(),
        },
        NewInsuranceCard {
            card_number: "HS4031122334455".into(),
            full_name: "Trần Thị B".into(),
            date_of_birth: date(1992, 8, 10),
            address: "789 Võ Văn Tần, Q3, TP.HCM".into(),
            issued_place: "BHXH TP. Hồ Chí Minh".into(),
            valid_from: date(2024, 6, 1),
            valid_to: date(2025, 5, 31),
            coverage_percentage: 80,
            hospital_level: "Hạng II".into(),
        },
        NewInsuranceCard {
            card_number: "HS4045566778899".into(),
            full_name: "Lê Văn C".into(),
            date_of_birth: date(1988, 12, 25),
            address: "321 Cách Mạng Tháng 8, Q10, TP.HCM".into(),
            issued_place: "BHXH TP. Hồ Chí Minh".into(),
            valid_from: date(2024, 3, 1),
            valid_to: date(2025, 2, 28),
            coverage_percentage: 90,
            hospital_level: "Hạng I".into(),
        },
        NewInsuranceCard {
            card_number: "DN5010111222333".into(),
            full_name: "Phạm Thị D".into(),
            date_of_birth: date(1995, 4, 18),
            address: "654 Hùng Vương, Q5, TP.HCM".into(),
            issued_place: "BHXH Đà Nẵng".into(),
            valid_from: date(2024, 2, 1),
            valid_to: date(2025, 1, 31),
            coverage_percentage: 75,
            hospital_level: "Hạng II".into(),
        },
        NewInsuranceCard {
            card_number: "HN6020444555666".into(),
            full_name: "Vũ Văn E".into(),
            date_of_birth: date(1987, 11, 3),
            address: "987 Lý Thái Tổ, Hoàn Kiếm, Hà Nội".into(),
            issued_place: "BHXH Hà Nội".into(),
            valid_from: date(2024, 1, 1),
            valid_to: date(2025, 12, 31),
            coverage_percentage: 85,
            hospital_level: "Hạng I".into(),
        },
        NewInsuranceCard {
            card_number: "CT7030777888999".into(),
            full_name: "Hoàng Thị F".into(),
            date_of_birth: date(1993, 7, 22),
            address: "159 Trần Hưng Đạo, Ninh Kiều, Cần Thơ".into(),
            issued_place: "BHXH Cần Thơ".into(),
            valid_from: date(2024, 4, 1),
            valid_to: date(2025, 3, 31),
            coverage_percentage: 80,
            hospital_level: "Hạng II".into(),
        },
        // Expired card, kept for exercising the expiry path.
        NewInsuranceCard {
            card_number: "HS4099888777666".into(),
            full_name: "Ngô Văn G".into(),
            date_of_birth: date(1980, 9, 14),
            address: "753 Điện Biên Phủ, Q3, TP.HCM".into(),
            issued_place: "BHXH TP. Hồ Chí Minh".into(),
            valid_from: date(2023, 12, 1),
            valid_to: date(2023, 11, 30),
            coverage_percentage: 95,
            hospital_level: "Hạng I".into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service() -> InsuranceService {
        InsuranceService::new(Arc::new(Database::new()))
    }

    fn a_card(number: &str, dob: NaiveDate, level: &str) -> NewInsuranceCard {
        NewInsuranceCard {
            card_number: number.into(),
            full_name: "Chủ thẻ".into(),
            date_of_birth: dob,
            address: "1 Đường Test".into(),
            issued_place: "BHXH Test".into(),
            valid_from: date(2024, 1, 1),
            valid_to: Utc::now().date_naive() + Duration::days(365),
            coverage_percentage: 80,
            hospital_level: level.into(),
        }
    }

    #[test]
    fn test_card_number_format() {
        assert!(is_well_formed_card_number("HS4010123456789"));
        assert!(!is_well_formed_card_number("hs4010123456789"), "lowercase prefix");
        assert!(!is_well_formed_card_number("HS401012345678"), "too short");
        assert!(!is_well_formed_card_number("HS40101234567890"), "too long");
        assert!(!is_well_formed_card_number("H54010123456789"), "digit in prefix");
        assert!(!is_well_formed_card_number("HS4010123A56789"), "letter in digits");
        assert!(!is_well_formed_card_number(""));
    }

    #[test]
    fn test_coverage_matrix() {
        assert_eq!(calculate_coverage("Hạng I", "Hạng I"), 100);
        assert_eq!(calculate_coverage("Hạng I", "Hạng II"), 80);
        assert_eq!(calculate_coverage("Hạng I", "Hạng III"), 60);
        assert_eq!(calculate_coverage("Hạng II", "Hạng III"), 80);
        assert_eq!(calculate_coverage("Hạng III", "Hạng II"), 100);
        assert_eq!(calculate_coverage("Hạng I", "không rõ"), 60, "unknown tier falls back");
    }

    #[test]
    fn test_validate_malformed_number() {
        let svc = service();
        let verdict = svc.validate("not-a-card", date(1990, 1, 1)).unwrap();
        assert!(!verdict.is_valid);
        assert!(verdict.message.contains("không đúng định dạng"));
        assert!(verdict.card_info.is_none());
    }

    #[test]
    fn test_validate_unknown_card() {
        let svc = service();
        let verdict = svc.validate("ZZ9999999999999", date(1990, 1, 1)).unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(verdict.message, "Thẻ BHYT không tồn tại trong hệ thống");
    }

    #[test]
    fn test_validate_dob_mismatch() {
        let svc = service();
        let dob = date(1991, 6, 6);
        svc.add_card(a_card("AB1234567890123", dob, "Hạng I")).unwrap();

        let verdict = svc.validate("AB1234567890123", date(1991, 6, 7)).unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(verdict.message, "Ngày sinh không khớp với thẻ BHYT");
    }

    #[test]
    fn test_validate_expired_card() {
        let svc = service();
        let dob = date(1980, 9, 14);
        let mut card = a_card("AB1234567890123", dob, "Hạng I");
        card.valid_to = Utc::now().date_naive() - Duration::days(1);
        svc.add_card(card).unwrap();

        let verdict = svc.validate("AB1234567890123", dob).unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(verdict.message, "Thẻ BHYT đã hết hạn");
    }

    #[test]
    fn test_validate_good_card_reports_matrix_coverage() {
        let svc = service();
        let dob = date(1992, 8, 10);
        svc.add_card(a_card("AB1234567890123", dob, "Hạng II")).unwrap();

        let verdict = svc.validate("AB1234567890123", dob).unwrap();
        assert!(verdict.is_valid);
        assert_eq!(verdict.message, "Thẻ BHYT hợp lệ");
        assert_eq!(verdict.coverage_percentage, Some(80), "Hạng I hospital, Hạng II card");
        assert_eq!(verdict.hospital_level.as_deref(), Some(HOSPITAL_LEVEL));
        assert!(verdict.card_info.is_some());
    }

    #[test]
    fn test_add_card_rejects_duplicates_and_bad_numbers() {
        let svc = service();
        let dob = date(1990, 1, 1);
        svc.add_card(a_card("AB1234567890123", dob, "Hạng I")).unwrap();

        let dup = svc.add_card(a_card("AB1234567890123", dob, "Hạng I")).unwrap_err();
        assert!(matches!(dup, HmsError::Conflict(_)));

        let bad = svc.add_card(a_card("bad", dob, "Hạng I")).unwrap_err();
        assert!(matches!(bad, HmsError::InvalidArgument(_)));
    }

    #[test]
    fn test_seed_is_idempotent() {
        let svc = service();
        assert_eq!(svc.seed_sample_cards().unwrap(), 8);
        assert_eq!(svc.seed_sample_cards().unwrap(), 0);
        assert_eq!(svc.list_cards().unwrap().len(), 8);
    }

    #[test]
    fn test_seeded_expired_card_fails_validation() {
        let svc = service();
        svc.seed_sample_cards().unwrap();
        let verdict = svc
            .validate("HS4099888777666", date(1980, 9, 14))
            .unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(verdict.message, "Thẻ BHYT đã hết hạn");
    }
}
