use perfume_shop_api::{
    config::AppConfig,
    db::{OrmConn, create_pool, orm_from_pool, run_migrations},
    entity::{
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    identity::Role,
    services::auth_service::hash_password,
};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let database_url = AppConfig::database_url_from_env()?;
    let orm = orm_from_pool(create_pool(&database_url).await?);
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@example.com", "admin123", "Admin", Role::Admin).await?;
    let client_id = ensure_user(
        &orm,
        "client@example.com",
        "client123",
        "Client",
        Role::Client,
    )
    .await?;
    seed_perfumes(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, Client ID: {client_id}");
    Ok(())
}

/// Creates the user or, if the email exists, only aligns its role.
async fn ensure_user(
    orm: &OrmConn,
    email: &str,
    password: &str,
    first_name: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        let id = existing.id;
        let mut active: UserActive = existing.into();
        active.role = Set(role.to_string());
        active.update(orm).await?;
        return Ok(id);
    }

    let password_hash = hash_password(password.to_string())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(password_hash),
        first_name: Set(first_name.to_string()),
        last_name: Set(None),
        phone: Set(None),
        role: Set(role.to_string()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(orm)
    .await?;
    Ok(user.id)
}

async fn seed_perfumes(orm: &OrmConn) -> anyhow::Result<()> {
    let perfumes = [
        ("Santal Noir", "Sandalwood, cedar and a trace of leather", 8_900, 40),
        ("Fleur de Sel", "Sea salt over white flowers", 6_500, 60),
        ("Oud Royale", "Dark oud with rose and saffron", 14_500, 15),
        ("Citrus Verde", "Bergamot, lime and vetiver", 4_200, 120),
    ];

    let mut inserted = 0;
    for (name, description, price, stock) in perfumes {
        let exists = Products::find()
            .filter(ProdCol::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }
        ProductActive {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(Some(description.to_string())),
            price: Set(price),
            stock: Set(stock),
            category_id: Set(None),
            image_url: Set(None),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(orm)
        .await?;
        inserted += 1;
    }

    println!("Seeded {inserted} perfumes");
    Ok(())
}
