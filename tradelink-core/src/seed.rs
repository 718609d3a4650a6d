/// Default dataset written into an empty store on first start.
use crate::store::{LinkStore, StoreError};
use crate::types::{CategoryDraft, LinkDraft};

struct SeedLink {
    title: &'static str,
    description: &'static str,
    url: &'static str,
}

struct SeedCategory {
    name: &'static str,
    description: &'static str,
    links: &'static [SeedLink],
}

const DEFAULT_DATA: &[SeedCategory] = &[
    SeedCategory {
        name: "무역 도우미",
        description: "기본 무역 서비스",
        links: &[
            SeedLink {
                title: "KOTRA 주요 서비스",
                description: "KOTRA 수출, 더 이상 어렵지 않아요",
                url: "https://kotra.or.kr",
            },
            SeedLink {
                title: "KOTRA 무역투자24",
                description: "한 눈에 보는 KOTRA 서비스",
                url: "https://kotra.or.kr/trade24",
            },
        ],
    },
    SeedCategory {
        name: "Trade AI",
        description: "AI 기반 서비스",
        links: &[SeedLink {
            title: "AI 수출정보 서비스",
            description: "KOTRA AI 기반 수출 정보",
            url: "https://ai.kotra.or.kr",
        }],
    },
    SeedCategory {
        name: "뉴스레터",
        description: "무역 뉴스 및 정보",
        links: &[
            SeedLink {
                title: "KOTRA 뉴스레터",
                description: "주간 무역 뉴스 및 정보",
                url: "https://kotra.or.kr/newsletter",
            },
            SeedLink {
                title: "한국무역협회 뉴스",
                description: "무역협회 공식 뉴스",
                url: "https://kita.or.kr/news",
            },
        ],
    },
    SeedCategory {
        name: "상담",
        description: "무역 상담 서비스",
        links: &[
            SeedLink {
                title: "1:1 상담 - 한국무역협회",
                description: "무역 전문가 1:1 상담",
                url: "https://kita.or.kr/consulting",
            },
            SeedLink {
                title: "KOTRA 온라인 상담",
                description: "KOTRA 온라인 상담 서비스",
                url: "https://kotra.or.kr/consulting",
            },
        ],
    },
    SeedCategory {
        name: "보고서",
        description: "전문 보고서 및 자료",
        links: &[
            SeedLink {
                title: "신용보고서",
                description: "기업 신용정보 보고서",
                url: "https://report.kotra.or.kr",
            },
            SeedLink {
                title: "국제무역 연구자료",
                description: "KOTRA 국제무역 연구 자료",
                url: "https://research.kotra.or.kr",
            },
        ],
    },
];

/// Insert the default categories and links when the store has no categories.
/// Returns whether anything was written.
pub async fn seed_defaults(store: &LinkStore) -> Result<bool, StoreError> {
    if !store.list_categories().await?.is_empty() {
        log::info!(target: "tradelink.seed", "Existing data found, skipping defaults");
        return Ok(false);
    }

    let mut link_count = 0;
    for seed in DEFAULT_DATA {
        let category = store
            .add_category(CategoryDraft::new(seed.name).with_description(seed.description))
            .await?;
        for link in seed.links {
            store
                .add_link(
                    LinkDraft::new(Some(category.id.clone()), link.title, link.url)
                        .with_description(link.description),
                )
                .await?;
            link_count += 1;
        }
    }

    log::info!(
        target: "tradelink.seed",
        "Seeded {} categories and {} links",
        DEFAULT_DATA.len(),
        link_count
    );
    Ok(true)
}
