use crate::types::{truncate_chars, EventKind, ProductRecord, UNKNOWN};

/// Shortest title worth keeping before falling back to cutting the whole
/// message.
const MIN_TITLE_CHARS: usize = 10;

/// `1234.4` -> `1,234円`
pub fn format_yen(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0 {
        format!("-{grouped}円")
    } else {
        format!("{grouped}円")
    }
}

/// Compose the post for `record`, at most `max_chars` characters long.
pub fn compose(kind: EventKind, record: &ProductRecord, max_chars: usize) -> String {
    compose_measured(kind, record, max_chars, |t| t.chars().count())
}

/// Compose the post for `record` so that `measure(text) <= max_len`.
///
/// The title is shortened first; if the fixed parts alone still do not fit,
/// the whole message is cut.
pub fn compose_measured<F>(kind: EventKind, record: &ProductRecord, max_len: usize, measure: F) -> String
where
    F: Fn(&str) -> usize,
{
    let full = render(kind, record, &record.title);
    if measure(&full) <= max_len {
        return full;
    }

    let title_chars = record.title.chars().count();
    let title_fits =
        |n: usize| measure(&render(kind, record, &truncate_chars(&record.title, n))) <= max_len;
    if title_chars > MIN_TITLE_CHARS && title_fits(MIN_TITLE_CHARS) {
        let keep = longest_fitting(MIN_TITLE_CHARS, title_chars - 1, title_fits);
        return render(kind, record, &truncate_chars(&record.title, keep));
    }

    let short = render(kind, record, &truncate_chars(&record.title, MIN_TITLE_CHARS));
    let keep = longest_fitting(0, short.chars().count(), |n| {
        measure(&truncate_chars(&short, n)) <= max_len
    });
    truncate_chars(&short, keep)
}

/// Largest `n` in `lo..=hi` with `fits(n)`, assuming `fits(lo)`.
fn longest_fitting(mut lo: usize, mut hi: usize, fits: impl Fn(usize) -> bool) -> usize {
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

fn render(kind: EventKind, r: &ProductRecord, title: &str) -> String {
    match kind {
        EventKind::Discount => match (r.discount(), r.current_price, r.reference_price) {
            (Some(d), Some(cur), Some(reference)) => format!(
                "🔥【{pct:.1}%オフ】Amazon割引情報🔥\n\n\
                 {title}\n\n\
                 ✅ 現在価格: {cur}\n\
                 ❌ 元の価格: {reference}\n\
                 💰 割引額: {amt}\n\n\
                 🛒 商品ページ: {url}\n\n\
                 #Amazonセール #お買い得 #タイムセール #PR",
                pct = d.percent,
                cur = format_yen(cur),
                reference = format_yen(reference),
                amt = format_yen(d.amount),
                url = r.detail_url,
            ),
            _ => render(EventKind::Generic, r, title),
        },
        EventKind::Restock => {
            let mut text = format!("📦【入荷速報】Amazonで在庫復活！📦\n\n{title}\n\n");
            if let Some(cur) = r.current_price {
                text.push_str(&format!("💲 価格: {}\n", format_yen(cur)));
            }
            text.push_str(&format!("📋 在庫状況: {}\n", r.availability_text));
            if r.seller_name != UNKNOWN {
                text.push_str(&format!("🏪 販売: {}\n", r.seller_name));
            }
            text.push_str(&format!(
                "\n🛒 商品ページ: {}\n\n#Amazon入荷 #在庫あり #お買い逃しなく #PR",
                r.detail_url
            ));
            text
        }
        EventKind::Generic => {
            let mut text = format!("📢【商品情報更新】Amazon商品情報📢\n\n{title}\n\n");
            if let Some(cur) = r.current_price {
                text.push_str(&format!("💲 価格: {}\n", format_yen(cur)));
            }
            text.push_str(&format!(
                "📋 在庫状況: {}\n\n🛒 商品ページ: {}\n\n#Amazon #商品情報 #PR",
                r.availability_text, r.detail_url
            ));
            text
        }
    }
}
