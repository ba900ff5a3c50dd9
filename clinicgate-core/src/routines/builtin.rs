//! The clinic's stored procedures and their example builders

use async_trait::async_trait;
use chrono::{Datelike, Duration, Local, Timelike};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Value};
use sqlx::mysql::MySqlConnection;

use super::{ExampleBuilder, ParamSpec, RoutineDefinition};
use crate::db::unique_suffix;
use crate::sql::JsonRow;
use crate::{Error, Result};

fn random_phone() -> String {
    format!("13{}", rand::thread_rng().gen_range(100_000_000..1_000_000_000u64))
}

fn random_id(prefix: &str) -> String {
    format!("{}_{}", prefix, unique_suffix())
}

fn money(amount: Decimal) -> Value {
    json!(amount
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default())
}

fn object(value: Value) -> JsonRow {
    match value {
        Value::Object(map) => map,
        _ => JsonRow::new(),
    }
}

fn unavailable(message: &str) -> Error {
    Error::ExampleUnavailable(message.to_string())
}

/// A fresh, plausible patient profile
pub struct RandomPatientProfile;

#[async_trait]
impl ExampleBuilder for RandomPatientProfile {
    async fn build(&self, _conn: &mut MySqlConnection) -> Result<JsonRow> {
        let now = Local::now();
        Ok(object(json!({
            "p_patient_name": format!("示例患者_{}", now.second()),
            "p_gender": "F",
            "p_birth_date": format!("{}-01-01", now.year() - 25),
            "p_id_card_no": random_id("ID"),
            "p_phone": random_phone(),
            "p_address": "示例路 88 号",
            "p_emergency_contact_name": "示例联系人",
            "p_emergency_contact_phone": random_phone(),
            "p_blood_type": "O",
            "p_allergy_history": "无明显过敏史",
        })))
    }
}

/// Newest active patient, with new contact details
pub struct ActivePatientContact;

#[async_trait]
impl ExampleBuilder for ActivePatientContact {
    async fn build(&self, conn: &mut MySqlConnection) -> Result<JsonRow> {
        let patient: Option<(i64,)> = sqlx::query_as(
            "SELECT CAST(patient_id AS SIGNED) FROM patient \
             WHERE is_active = 1 ORDER BY patient_id DESC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await?;
        let (patient_id,) = patient.ok_or_else(|| unavailable("No active patient found; create a patient first"))?;

        Ok(object(json!({
            "p_patient_id": patient_id,
            "p_phone": random_phone(),
            "p_address": "更新地址：示例小区 3-2-201",
            "p_emergency_contact_name": "新的联系人",
            "p_emergency_contact_phone": random_phone(),
        })))
    }
}

/// A schedule with free quota and a patient not yet registered on it
pub struct RegistrationCandidate;

#[async_trait]
impl ExampleBuilder for RegistrationCandidate {
    async fn build(&self, conn: &mut MySqlConnection) -> Result<JsonRow> {
        let schedules: Vec<(i64,)> = sqlx::query_as(
            "SELECT CAST(s.schedule_id AS SIGNED) \
             FROM doctor_schedule s \
             LEFT JOIN registration r \
               ON r.schedule_id = s.schedule_id AND r.status IN ('CONFIRMED','COMPLETED') \
             WHERE s.is_active = 1 \
             GROUP BY s.schedule_id, s.quota, s.schedule_date \
             HAVING COUNT(r.registration_id) < s.quota \
             ORDER BY s.schedule_date DESC, s.schedule_id DESC \
             LIMIT 5",
        )
        .fetch_all(&mut *conn)
        .await?;

        for (schedule_id,) in schedules {
            let patient: Option<(i64,)> = sqlx::query_as(
                "SELECT CAST(p.patient_id AS SIGNED) FROM patient p \
                 WHERE p.is_active = 1 \
                   AND NOT EXISTS ( \
                     SELECT 1 FROM registration r \
                     WHERE r.schedule_id = ? AND r.patient_id = p.patient_id) \
                 ORDER BY p.patient_id DESC LIMIT 1",
            )
            .bind(schedule_id)
            .fetch_optional(&mut *conn)
            .await?;

            if let Some((patient_id,)) = patient {
                return Ok(object(json!({
                    "p_patient_id": patient_id,
                    "p_schedule_id": schedule_id,
                    "p_chief_complaint": "自动示例主诉：发热三天",
                })));
            }
        }
        Err(unavailable("No schedule with free quota and an unregistered patient; create a patient or schedule first"))
    }
}

/// Encounter holding the most recent unbilled charges
pub struct EncounterWithUnbilledCharges;

#[async_trait]
impl ExampleBuilder for EncounterWithUnbilledCharges {
    async fn build(&self, conn: &mut MySqlConnection) -> Result<JsonRow> {
        let encounter: Option<(i64,)> = sqlx::query_as(
            "SELECT CAST(c.encounter_id AS SIGNED) \
             FROM charge c \
             WHERE c.status = 'UNBILLED' AND c.encounter_id IS NOT NULL \
             GROUP BY c.encounter_id \
             ORDER BY MIN(c.charged_at) DESC, c.encounter_id DESC \
             LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await?;
        let (encounter_id,) =
            encounter.ok_or_else(|| unavailable("No encounter with unbilled charges; record a charge first"))?;

        Ok(object(json!({ "p_encounter_id": encounter_id, "p_note": "集中开票示例" })))
    }
}

/// Open invoice with an outstanding balance; pays the balance
pub struct PayableInvoice;

#[async_trait]
impl ExampleBuilder for PayableInvoice {
    async fn build(&self, conn: &mut MySqlConnection) -> Result<JsonRow> {
        let invoice: Option<(i64, Decimal, Decimal)> = sqlx::query_as(
            "SELECT CAST(i.invoice_id AS SIGNED), \
                    CAST(IFNULL(i.total_amount, 0.00) AS DECIMAL(14,2)), \
                    CAST(IFNULL(i.paid_amount, 0.00) AS DECIMAL(14,2)) \
             FROM invoice i \
             WHERE i.status IN ('OPEN','PARTIALLY_PAID') \
               AND IFNULL(i.total_amount, 0.00) > IFNULL(i.paid_amount, 0.00) \
             ORDER BY i.invoice_id DESC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await?;
        let (invoice_id, total, paid) =
            invoice.ok_or_else(|| unavailable("No invoice awaiting payment; create an invoice first"))?;

        let remaining = (total - paid).max(Decimal::new(1, 2));
        Ok(object(json!({
            "p_invoice_id": invoice_id,
            "p_method": "CASH",
            "p_amount": money(remaining),
            "p_transaction_ref": random_id("pay"),
        })))
    }
}

/// Unpaid, not yet voided invoice
pub struct VoidableInvoice;

#[async_trait]
impl ExampleBuilder for VoidableInvoice {
    async fn build(&self, conn: &mut MySqlConnection) -> Result<JsonRow> {
        let invoice: Option<(i64,)> = sqlx::query_as(
            "SELECT CAST(i.invoice_id AS SIGNED) FROM invoice i \
             WHERE i.status <> 'VOID' AND IFNULL(i.paid_amount, 0.00) = 0.00 \
             ORDER BY i.invoice_id DESC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await?;
        let (invoice_id,) =
            invoice.ok_or_else(|| unavailable("No voidable (unpaid) invoice found; create an invoice first"))?;

        Ok(object(json!({ "p_invoice_id": invoice_id, "p_reason": "示例原因：信息错误" })))
    }
}

/// Successful payment not fully refunded; suggests half the remainder
pub struct RefundablePayment;

#[async_trait]
impl ExampleBuilder for RefundablePayment {
    async fn build(&self, conn: &mut MySqlConnection) -> Result<JsonRow> {
        let payment: Option<(i64, Decimal, Decimal)> = sqlx::query_as(
            "SELECT CAST(p.payment_id AS SIGNED) AS payment_id, \
                    CAST(p.amount AS DECIMAL(14,2)) AS amount, \
                    CAST((SELECT IFNULL(SUM(r.amount), 0.00) FROM refund r \
                          WHERE r.payment_id = p.payment_id AND r.status = 'SUCCESS') \
                         AS DECIMAL(14,2)) AS refunded \
             FROM payment p \
             WHERE p.status = 'SUCCESS' \
             HAVING amount > refunded \
             ORDER BY payment_id DESC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await?;
        let (payment_id, amount, refunded) =
            payment.ok_or_else(|| unavailable("No refundable payment found; create a payment first"))?;

        let cent = Decimal::new(1, 2);
        let remaining = (amount - refunded).max(cent);
        let suggested = remaining.min((remaining / Decimal::TWO).round_dp(2).max(cent));
        Ok(object(json!({
            "p_payment_id": payment_id,
            "p_amount": money(suggested),
            "p_reason": "示例原因：重复收费",
        })))
    }
}

/// `[today - days_back, today]` as report bounds
pub struct TrailingDateRange {
    pub days_back: i64,
}

#[async_trait]
impl ExampleBuilder for TrailingDateRange {
    async fn build(&self, _conn: &mut MySqlConnection) -> Result<JsonRow> {
        let end = Local::now().date_naive();
        let start = end - Duration::days(self.days_back);
        Ok(object(json!({
            "p_start_date": start.format("%Y-%m-%d").to_string(),
            "p_end_date": end.format("%Y-%m-%d").to_string(),
        })))
    }
}

fn report(name: &str, display_name: &str, description: &str) -> RoutineDefinition {
    RoutineDefinition::new(name, display_name, "统计", description)
        .param(ParamSpec::date("p_start_date", "开始日期"))
        .param(ParamSpec::date("p_end_date", "结束日期"))
        .example(TrailingDateRange { days_back: 6 })
}

pub(super) fn definitions() -> Vec<RoutineDefinition> {
    vec![
        RoutineDefinition::new("sp_patient_create", "创建患者档案", "患者", "创建患者档案并生成唯一 patient_no。")
            .param(ParamSpec::text("p_patient_name", "患者姓名").required().placeholder("李雷"))
            .param(ParamSpec::text("p_gender", "性别").placeholder("F/M/U"))
            .param(ParamSpec::text("p_birth_date", "出生日期").placeholder("1995-05-20"))
            .param(ParamSpec::text("p_id_card_no", "证件号").placeholder("ID_xxx"))
            .param(ParamSpec::text("p_phone", "电话").placeholder("13xxxxxxxxx"))
            .param(ParamSpec::text("p_address", "地址").placeholder("示例地址"))
            .param(ParamSpec::text("p_emergency_contact_name", "紧急联系人").placeholder("王五"))
            .param(ParamSpec::text("p_emergency_contact_phone", "紧急联系人电话").placeholder("139xxxx"))
            .param(ParamSpec::text("p_blood_type", "血型").placeholder("A/B/AB/O/U"))
            .param(ParamSpec::text("p_allergy_history", "过敏史").placeholder("过敏史备注"))
            .output("o_patient_id", "患者ID")
            .output("o_patient_no", "患者编号")
            .example(RandomPatientProfile),
        RoutineDefinition::new(
            "sp_patient_update_contact",
            "更新患者联系信息",
            "患者",
            "仅更新非 NULL 的电话/地址/紧急联系人字段。",
        )
        .param(ParamSpec::number("p_patient_id", "患者ID").required())
        .param(ParamSpec::text("p_phone", "电话").placeholder("13xxxxxxxxx"))
        .param(ParamSpec::text("p_address", "地址").placeholder("示例地址"))
        .param(ParamSpec::text("p_emergency_contact_name", "紧急联系人"))
        .param(ParamSpec::text("p_emergency_contact_phone", "紧急联系人电话"))
        .example(ActivePatientContact),
        RoutineDefinition::new(
            "sp_outpatient_register",
            "门诊挂号",
            "门诊",
            "完成挂号并自动创建就诊、费用（含游标校验号源）。",
        )
        .param(ParamSpec::number("p_patient_id", "患者ID").required())
        .param(ParamSpec::number("p_schedule_id", "排班ID").required())
        .param(ParamSpec::text("p_chief_complaint", "主诉").placeholder("发热三天"))
        .output("o_registration_id", "挂号ID")
        .output("o_registration_no", "挂号单号")
        .output("o_encounter_id", "就诊ID")
        .output("o_encounter_no", "就诊号")
        .output("o_charge_id", "费用ID")
        .example(RegistrationCandidate),
        RoutineDefinition::new(
            "sp_invoice_create_for_encounter",
            "生成发票（游标）",
            "收费",
            "为就诊集中开票，将所有 UNBILLED 费用写入一张发票（游标遍历费用）。",
        )
        .param(ParamSpec::number("p_encounter_id", "就诊ID").required())
        .param(ParamSpec::text("p_note", "备注").placeholder("集中开票示例"))
        .output("o_invoice_id", "发票ID")
        .output("o_invoice_no", "发票号")
        .output("o_line_count", "明细行数")
        .example(EncounterWithUnbilledCharges),
        RoutineDefinition::new(
            "sp_invoice_void",
            "作废发票（游标）",
            "收费",
            "作废发票并释放费用（游标删除发票明细）。仅支持未支付发票。",
        )
        .param(ParamSpec::number("p_invoice_id", "发票ID").required())
        .param(ParamSpec::text("p_reason", "作废原因").placeholder("示例原因：信息错误"))
        .output("o_detached_count", "释放费用条数")
        .example(VoidableInvoice),
        RoutineDefinition::new("sp_payment_create", "创建支付", "支付", "创建支付并联动更新发票已付金额。")
            .param(ParamSpec::number("p_invoice_id", "发票ID").required())
            .param(ParamSpec::text("p_method", "支付方式").placeholder("CASH/CARD/WECHAT/ALIPAY/TRANSFER/OTHER"))
            .param(ParamSpec::number("p_amount", "金额").required())
            .param(ParamSpec::text("p_transaction_ref", "交易参考号").placeholder("pay_xxx"))
            .output("o_payment_id", "支付ID")
            .output("o_payment_no", "支付单号")
            .example(PayableInvoice),
        RoutineDefinition::new("sp_refund_create", "创建退款", "支付", "创建退款并联动更新发票已付金额。")
            .param(ParamSpec::number("p_payment_id", "支付ID").required())
            .param(ParamSpec::number("p_amount", "退款金额").required())
            .param(ParamSpec::text("p_reason", "退款原因").placeholder("示例原因：重复收费"))
            .output("o_refund_id", "退款ID")
            .output("o_refund_no", "退款单号")
            .example(RefundablePayment),
        report(
            "sp_stats_department_overview",
            "科室经营总览（游标）",
            "按科室聚合挂号/就诊/开票/费用，游标遍历科室写入临时表。",
        )
        .output("o_department_count", "科室数")
        .output("o_total_encounters", "总就诊数")
        .output("o_total_charge_amount", "费用总额"),
        report("sp_stats_billing_trend", "收费日报（游标）", "按日输出开票数、支付/退款与净额，游标遍历日期集合。")
            .output("o_day_count", "天数")
            .output("o_total_net_payment", "净收款汇总"),
        report(
            "sp_stats_doctor_workload",
            "医生工作量（游标）",
            "按医生汇总就诊、处方、检验开单次数，游标遍历医生列表。",
        )
        .output("o_doctor_count", "医生数")
        .output("o_total_encounters", "总就诊数")
        .output("o_total_prescriptions", "总处方数")
        .output("o_total_lab_orders", "总检验单数"),
        report("sp_stats_patient_outstanding", "患者应收（游标）", "按患者遍历未结清发票，汇总欠款金额与发票数量。")
            .output("o_patient_count", "患者数")
            .output("o_total_outstanding", "欠款总额"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_phone_shape() {
        let phone = random_phone();
        assert_eq!(phone.len(), 11);
        assert!(phone.starts_with("13"));
        assert!(phone.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_money_rounds_to_cents() {
        assert_eq!(money(Decimal::new(12345, 3)), json!(12.35));
        assert_eq!(money(Decimal::new(1, 2)), json!(0.01));
    }

    #[test]
    fn test_required_params_per_routine() {
        let defs = definitions();
        let create = defs.iter().find(|d| d.name == "sp_patient_create").unwrap();
        let required: Vec<_> = create.params.iter().filter(|p| p.required).map(|p| p.name.as_str()).collect();
        assert_eq!(required, vec!["p_patient_name"]);

        let payment = defs.iter().find(|d| d.name == "sp_payment_create").unwrap();
        let required: Vec<_> = payment.params.iter().filter(|p| p.required).map(|p| p.name.as_str()).collect();
        assert_eq!(required, vec!["p_invoice_id", "p_amount"]);
    }

    #[test]
    fn test_reports_share_date_contract() {
        for def in definitions().iter().filter(|d| d.category == "统计") {
            assert_eq!(def.params.len(), 2, "{}", def.name);
            assert!(def.params.iter().all(|p| !p.required && p.placeholder.as_deref() == Some("YYYY-MM-DD")));
        }
    }
}
