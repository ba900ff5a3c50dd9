//! Human labels for catalog objects
//!
//! Views rarely carry table comments, so the common ones have fixed labels.
//! Everything else falls back to the catalog comment, then to the raw name.

use std::collections::HashMap;

lazy_static::lazy_static! {
    static ref OBJECT_LABELS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("v_patient_public", "患者公开信息");
        m.insert("v_schedule_public", "医生排班公开");
        m.insert("v_encounter_summary", "就诊概要");
        m.insert("v_prescription_detail", "处方明细");
        m.insert("v_lab_result_detail", "检验结果明细");
        m.insert("v_invoice_summary", "发票概要");
        m.insert("v_invoice_detail", "发票明细");
        m.insert("v_current_staff", "当前员工信息");
        m.insert("v_current_staff_departments", "当前员工科室列表");
        m.insert("v_patient_reception", "患者信息（前台）");
        m.insert("v_patient_clinical", "患者临床信息");
        m.insert("v_drug_catalog_active", "药品目录（启用）");
        m.insert("v_lab_test_catalog_active", "检验项目目录（启用）");
        m.insert("v_charge_catalog_active", "收费项目目录");
        m.insert("v_registration_detail", "挂号详情");
        m.insert("v_encounter_detail", "就诊详情");
        m.insert("v_encounter_diagnosis_detail", "就诊诊断详情");
        m.insert("v_inpatient_current", "在院住院清单");
        m.insert("v_bed_occupancy", "床位占用概览");
        m.insert("v_pharmacy_dispense_queue", "药房待发药队列");
        m.insert("v_pharmacy_dispense_detail", "药房发药记录");
        m.insert("v_lab_worklist", "检验工作台");
        m.insert("v_payment_refund_detail", "支付/退款流水");
        m.insert("v_doctor_my_schedule", "我的排班");
        m.insert("v_doctor_my_registrations", "我的挂号");
        m.insert("v_doctor_my_encounters", "我的就诊");
        m.insert("v_doctor_my_encounter_diagnoses", "我的诊断");
        m.insert("v_doctor_my_prescriptions_detail", "我的处方明细");
        m.insert("v_doctor_my_lab_results", "我的检验结果");
        m.insert("v_nurse_my_inpatients", "护士-我的在院病人");
        m.insert("v_lab_my_items", "检验-我的项目");
        m.insert("v_cashier_unbilled_charges", "收银-未开票费用");
        m.insert("v_current_patient", "当前患者");
        m.insert("v_patient_my_encounters", "患者-我的就诊");
        m.insert("v_patient_my_prescriptions", "患者-我的处方");
        m.insert("v_patient_my_lab_results", "患者-我的检验结果");
        m.insert("v_patient_my_invoices", "患者-我的发票");
        m.insert("v_patient_my_invoice_details", "患者-我的发票明细");
        m
    };
}

/// Resolve the label shown for `object_name`
pub fn resolve_display_name(object_name: &str, comment: Option<&str>) -> String {
    if let Some(label) = OBJECT_LABELS.get(object_name) {
        return label.to_string();
    }
    match comment.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => object_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_name_wins() {
        assert_eq!(resolve_display_name("v_patient_public", None), "患者公开信息");
        assert_eq!(resolve_display_name("v_lab_worklist", Some("ignored")), "检验工作台");
    }

    #[test]
    fn test_comment_fallback() {
        assert_eq!(resolve_display_name("unknown_table", Some("  Some Comment ")), "Some Comment");
    }

    #[test]
    fn test_raw_name_fallback() {
        assert_eq!(resolve_display_name("unknown_table", None), "unknown_table");
        assert_eq!(resolve_display_name("unknown_table", Some("   ")), "unknown_table");
    }
}
