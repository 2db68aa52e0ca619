use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::ApiError;
use crate::routes::venue::model::Venue;

/// 成员状态，pending 不算正式成员
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Pending,
    Member,
    CoHost,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Member => "member",
            MembershipStatus::CoHost => "co-host",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(MembershipStatus::Pending),
            "member" => Some(MembershipStatus::Member),
            "co-host" => Some(MembershipStatus::CoHost),
            _ => None,
        }
    }
}

/// 路由守卫要求的能力等级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    Organizer,
    CoHost,
    Member,
}

/// 组织者拥有全部能力；其余按成员状态判定
pub fn role_satisfied(
    is_organizer: bool,
    status: Option<MembershipStatus>,
    required: GroupRole,
) -> bool {
    if is_organizer {
        return true;
    }
    match required {
        GroupRole::Organizer => false,
        GroupRole::CoHost => matches!(status, Some(MembershipStatus::CoHost)),
        GroupRole::Member => matches!(
            status,
            Some(MembershipStatus::Member | MembershipStatus::CoHost)
        ),
    }
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    pub organizer_id: i64,
    pub name: String,
    pub about: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub private: bool,
    pub city: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 列表行：群组 + 聚合出的成员数和预览图
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: i64,
    pub organizer_id: i64,
    pub name: String,
    pub about: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub private: bool,
    pub city: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub num_members: i64,
    pub preview_image: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupImage {
    pub id: i64,
    pub group_id: i64,
    pub url: String,
    pub preview: bool,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub status: String,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetail {
    pub id: i64,
    pub organizer_id: i64,
    pub name: String,
    pub about: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub private: bool,
    pub city: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub num_members: i64,
    pub images: Vec<GroupImage>,
    pub venues: Vec<Venue>,
    pub organizer: UserSummary,
}

pub const GROUP_KINDS: [&str; 2] = ["Online", "In person"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInput {
    pub name: Option<String>,
    pub about: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub private: Option<bool>,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug)]
pub struct ValidGroupInput {
    pub name: String,
    pub about: String,
    pub kind: String,
    pub private: bool,
    pub city: String,
    pub state: String,
}

impl GroupInput {
    pub fn validate(self) -> Result<ValidGroupInput, ApiError> {
        let mut errors: BTreeMap<&'static str, String> = BTreeMap::new();

        let name = self.name.unwrap_or_default();
        if name.trim().is_empty() {
            errors.insert("name", "Name is required".into());
        } else if name.chars().count() > 60 {
            errors.insert("name", "Name must be 60 characters or less".into());
        }

        let about = self.about.unwrap_or_default();
        if about.chars().count() < 50 {
            errors.insert("about", "About must be 50 characters or more".into());
        }

        let kind = self.kind.unwrap_or_default();
        if !GROUP_KINDS.contains(&kind.as_str()) {
            errors.insert("type", "Type must be 'Online' or 'In person'".into());
        }

        if self.private.is_none() {
            errors.insert("private", "Private must be a boolean".into());
        }

        let city = self.city.unwrap_or_default();
        if city.trim().is_empty() {
            errors.insert("city", "City is required".into());
        }
        let state = self.state.unwrap_or_default();
        if state.trim().is_empty() {
            errors.insert("state", "State is required".into());
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        Ok(ValidGroupInput {
            name,
            about,
            kind,
            private: self.private.unwrap_or_default(),
            city,
            state,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct GroupImageInput {
    pub url: Option<String>,
    pub preview: Option<bool>,
}

#[derive(Debug)]
pub struct ValidGroupImageInput {
    pub url: String,
    pub preview: bool,
}

impl GroupImageInput {
    pub fn validate(self) -> Result<ValidGroupImageInput, ApiError> {
        let url = self.url.unwrap_or_default();
        if url.trim().is_empty() {
            return Err(ApiError::field("url", "Image url is required"));
        }
        Ok(ValidGroupImageInput {
            url,
            preview: self.preview.unwrap_or_default(),
        })
    }
}

const GROUP_COLUMNS: &str =
    "id, organizer_id, name, about, kind, private, city, state, created_at, updated_at";

/// 成员数与预览图的聚合子查询；预览图取 id 最大的一条，保证结果确定
const SUMMARY_COLUMNS: &str = r#"
    g.id, g.organizer_id, g.name, g.about, g.kind, g.private, g.city, g.state,
    g.created_at, g.updated_at,
    (SELECT COUNT(*) FROM memberships m WHERE m.group_id = g.id) AS num_members,
    (SELECT gi.url FROM group_images gi
       WHERE gi.group_id = g.id AND gi.preview
       ORDER BY gi.id DESC LIMIT 1) AS preview_image
"#;

impl Group {
    pub async fn list(pool: &PgPool) -> Result<Vec<GroupSummary>, ApiError> {
        let groups = sqlx::query_as::<_, GroupSummary>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM groups g ORDER BY g.id"
        ))
        .fetch_all(pool)
        .await?;

        Ok(groups)
    }

    /// 请求者组织或加入的群组，单条聚合查询
    pub async fn list_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<GroupSummary>, ApiError> {
        let groups = sqlx::query_as::<_, GroupSummary>(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS} FROM groups g
            WHERE g.organizer_id = $1
               OR EXISTS (SELECT 1 FROM memberships m
                            WHERE m.group_id = g.id AND m.user_id = $1)
            ORDER BY g.id
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(groups)
    }

    pub async fn find_or_404(pool: &PgPool, group_id: i64) -> Result<Self, ApiError> {
        sqlx::query_as::<_, Group>(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1"))
            .bind(group_id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::NotFound("Group couldn't be found"))
    }

    /// 能力守卫：找不到资源是404，权限不足是403，两者不混用
    pub async fn require_role(
        &self,
        pool: &PgPool,
        user_id: i64,
        required: GroupRole,
    ) -> Result<(), ApiError> {
        let status = Membership::status_for(pool, self.id, user_id).await?;
        if role_satisfied(self.organizer_id == user_id, status, required) {
            return Ok(());
        }
        Err(ApiError::Forbidden(match required {
            GroupRole::Organizer => "Only the organizer may perform this action",
            GroupRole::CoHost => "Requires organizer or co-host standing",
            GroupRole::Member => "Requires membership in this group",
        }))
    }

    pub async fn detail(pool: &PgPool, group_id: i64) -> Result<GroupDetail, ApiError> {
        let group = Self::find_or_404(pool, group_id).await?;

        let images = sqlx::query_as::<_, GroupImage>(
            "SELECT id, group_id, url, preview FROM group_images WHERE group_id = $1 ORDER BY id",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        let venues = Venue::list_for_group(pool, group_id).await?;

        let organizer = sqlx::query_as::<_, UserSummary>(
            "SELECT id, first_name, last_name FROM users WHERE id = $1",
        )
        .bind(group.organizer_id)
        .fetch_one(pool)
        .await?;

        let num_members =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM memberships WHERE group_id = $1")
                .bind(group_id)
                .fetch_one(pool)
                .await?;

        Ok(GroupDetail {
            id: group.id,
            organizer_id: group.organizer_id,
            name: group.name,
            about: group.about,
            kind: group.kind,
            private: group.private,
            city: group.city,
            state: group.state,
            created_at: group.created_at,
            updated_at: group.updated_at,
            num_members,
            images,
            venues,
            organizer,
        })
    }

    /// 建群和组织者成员行在同一事务中落库
    pub async fn create(
        pool: &PgPool,
        input: ValidGroupInput,
        organizer_id: i64,
    ) -> Result<Self, ApiError> {
        let mut tx = pool.begin().await?;

        let group = sqlx::query_as::<_, Group>(&format!(
            r#"
            INSERT INTO groups (organizer_id, name, about, kind, private, city, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(organizer_id)
        .bind(&input.name)
        .bind(&input.about)
        .bind(&input.kind)
        .bind(input.private)
        .bind(&input.city)
        .bind(&input.state)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO memberships (group_id, user_id, status) VALUES ($1, $2, $3)")
            .bind(group.id)
            .bind(organizer_id)
            .bind(MembershipStatus::Member.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(group)
    }

    pub async fn update(
        pool: &PgPool,
        group_id: i64,
        input: ValidGroupInput,
    ) -> Result<Self, ApiError> {
        sqlx::query_as::<_, Group>(&format!(
            r#"
            UPDATE groups
            SET name = $1, about = $2, kind = $3, private = $4, city = $5, state = $6,
                updated_at = NOW()
            WHERE id = $7
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(&input.name)
        .bind(&input.about)
        .bind(&input.kind)
        .bind(input.private)
        .bind(&input.city)
        .bind(&input.state)
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Group couldn't be found"))
    }

    /// 依赖行由外键级联清除
    pub async fn delete(pool: &PgPool, group_id: i64) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 设为预览图时先清掉其它预览标记，同一群组最多一张预览图
    pub async fn add_image(
        pool: &PgPool,
        group_id: i64,
        input: ValidGroupImageInput,
    ) -> Result<GroupImage, ApiError> {
        let mut tx = pool.begin().await?;

        if input.preview {
            sqlx::query("UPDATE group_images SET preview = FALSE WHERE group_id = $1 AND preview")
                .bind(group_id)
                .execute(&mut *tx)
                .await?;
        }

        let image = sqlx::query_as::<_, GroupImage>(
            r#"
            INSERT INTO group_images (group_id, url, preview)
            VALUES ($1, $2, $3)
            RETURNING id, group_id, url, preview
            "#,
        )
        .bind(group_id)
        .bind(&input.url)
        .bind(input.preview)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(image)
    }
}

impl Membership {
    pub async fn status_for(
        pool: &PgPool,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<MembershipStatus>, ApiError> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM memberships WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        match status {
            None => Ok(None),
            Some(raw) => MembershipStatus::parse(&raw)
                .map(Some)
                .ok_or_else(|| ApiError::Internal(format!("unknown membership status: {raw}"))),
        }
    }

    pub async fn request(pool: &PgPool, group_id: i64, user_id: i64) -> Result<Self, ApiError> {
        match Self::status_for(pool, group_id, user_id).await? {
            Some(MembershipStatus::Pending) => Err(ApiError::field(
                "membership",
                "Membership has already been requested",
            )),
            Some(_) => Err(ApiError::field(
                "membership",
                "User is already a member of the group",
            )),
            None => {
                let membership = sqlx::query_as::<_, Membership>(
                    r#"
                    INSERT INTO memberships (group_id, user_id, status)
                    VALUES ($1, $2, $3)
                    RETURNING id, group_id, user_id, status
                    "#,
                )
                .bind(group_id)
                .bind(user_id)
                .bind(MembershipStatus::Pending.as_str())
                .fetch_one(pool)
                .await?;

                Ok(membership)
            }
        }
    }

    pub async fn set_status(
        pool: &PgPool,
        group_id: i64,
        member_id: i64,
        status: MembershipStatus,
    ) -> Result<Self, ApiError> {
        sqlx::query_as::<_, Membership>(
            r#"
            UPDATE memberships
            SET status = $1
            WHERE group_id = $2 AND user_id = $3
            RETURNING id, group_id, user_id, status
            "#,
        )
        .bind(status.as_str())
        .bind(group_id)
        .bind(member_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound(
            "Membership between the user and the group does not exist",
        ))
    }

    pub async fn remove(pool: &PgPool, group_id: i64, member_id: i64) -> Result<(), ApiError> {
        let deleted = sqlx::query_scalar::<_, i64>(
            "DELETE FROM memberships WHERE group_id = $1 AND user_id = $2 RETURNING id",
        )
        .bind(group_id)
        .bind(member_id)
        .fetch_optional(pool)
        .await?;

        match deleted {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound(
                "Membership between the user and the group does not exist",
            )),
        }
    }

    /// 只有组织者和副主持能看到待审核成员
    pub async fn list_for_group(
        pool: &PgPool,
        group_id: i64,
        include_pending: bool,
    ) -> Result<Vec<MemberInfo>, ApiError> {
        let mut sql = String::from(
            r#"
            SELECT u.id, u.first_name, u.last_name, m.status
            FROM memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.group_id = $1
            "#,
        );
        if !include_pending {
            sql.push_str(" AND m.status <> 'pending'");
        }
        sql.push_str(" ORDER BY u.id");

        let members = sqlx::query_as::<_, MemberInfo>(&sql)
            .bind(group_id)
            .fetch_all(pool)
            .await?;

        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_input() -> GroupInput {
        GroupInput {
            name: Some("Evening Hill Runners".into()),
            about: Some("A".repeat(50)),
            kind: Some("In person".into()),
            private: Some(false),
            city: Some("Portland".into()),
            state: Some("OR".into()),
        }
    }

    fn validation_errors(input: GroupInput) -> BTreeMap<&'static str, String> {
        match input.validate().unwrap_err() {
            ApiError::Validation(errors) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn valid_group_input_passes() {
        assert!(full_input().validate().is_ok());
    }

    #[test]
    fn about_length_boundary() {
        let mut input = full_input();
        input.about = Some("A".repeat(49));
        assert!(validation_errors(input).contains_key("about"));

        let mut input = full_input();
        input.about = Some("A".repeat(50));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn name_length_boundary() {
        let mut input = full_input();
        input.name = Some("N".repeat(61));
        assert!(validation_errors(input).contains_key("name"));

        let mut input = full_input();
        input.name = Some("N".repeat(60));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn kind_must_be_known() {
        let mut input = full_input();
        input.kind = Some("Hybrid".into());
        assert!(validation_errors(input).contains_key("type"));
    }

    #[test]
    fn missing_private_flag_is_reported() {
        let mut input = full_input();
        input.private = None;
        assert!(validation_errors(input).contains_key("private"));
    }

    #[test]
    fn membership_status_round_trip() {
        for status in [
            MembershipStatus::Pending,
            MembershipStatus::Member,
            MembershipStatus::CoHost,
        ] {
            assert_eq!(MembershipStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MembershipStatus::parse("banned"), None);
    }

    #[test]
    fn organizer_satisfies_every_role() {
        for required in [GroupRole::Organizer, GroupRole::CoHost, GroupRole::Member] {
            assert!(role_satisfied(true, None, required));
        }
    }

    #[test]
    fn cohost_covers_cohost_and_member_but_not_organizer() {
        let status = Some(MembershipStatus::CoHost);
        assert!(!role_satisfied(false, status, GroupRole::Organizer));
        assert!(role_satisfied(false, status, GroupRole::CoHost));
        assert!(role_satisfied(false, status, GroupRole::Member));
    }

    #[test]
    fn plain_member_only_satisfies_member() {
        let status = Some(MembershipStatus::Member);
        assert!(!role_satisfied(false, status, GroupRole::Organizer));
        assert!(!role_satisfied(false, status, GroupRole::CoHost));
        assert!(role_satisfied(false, status, GroupRole::Member));
    }

    #[test]
    fn pending_and_absent_satisfy_nothing() {
        for status in [None, Some(MembershipStatus::Pending)] {
            assert!(!role_satisfied(false, status, GroupRole::Organizer));
            assert!(!role_satisfied(false, status, GroupRole::CoHost));
            assert!(!role_satisfied(false, status, GroupRole::Member));
        }
    }

    #[test]
    fn image_input_requires_url() {
        let input = GroupImageInput {
            url: Some("  ".into()),
            preview: Some(true),
        };
        assert!(input.validate().is_err());

        let input = GroupImageInput {
            url: Some("https://img.example.com/banner.png".into()),
            preview: None,
        };
        let valid = input.validate().unwrap();
        assert!(!valid.preview);
    }
}
